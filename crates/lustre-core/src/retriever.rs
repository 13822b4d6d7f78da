//! Query text to ranked `(record, score)` pairs over one snapshot.

use serde::Serialize;
use tracing::debug;

use crate::catalog::ProductRecord;
use crate::config::RetrievalConfig;
use crate::embed::{embed_normalized, EmbedError, Embedder};
use crate::snapshot::IndexSnapshot;
use crate::store::StoreError;

/// Smallest over-fetch multiplier applied to a request.
const MIN_OVERFETCH: usize = 2;

/// A catalog record and its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub record: ProductRecord,
    pub score: f32,
}

#[derive(Debug)]
pub struct Retriever<E> {
    embedder: E,
    overfetch_factor: usize,
    max_candidates: usize,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(embedder: E, cfg: &RetrievalConfig) -> Self {
        Self {
            embedder,
            overfetch_factor: cfg.overfetch_factor.max(MIN_OVERFETCH),
            max_candidates: cfg.max_candidates,
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Candidates fetched for `requested_k`: the over-fetch multiple, capped at
    /// `max_candidates` but never below `requested_k` itself.
    pub fn candidate_count(&self, requested_k: usize) -> usize {
        let wanted = requested_k.saturating_mul(self.overfetch_factor);
        wanted.min(self.max_candidates.max(requested_k))
    }

    /// Ranked candidates for `query`, best first, ties in catalog order.
    /// An empty snapshot yields an empty list without calling the embedder.
    pub async fn retrieve(
        &self,
        snapshot: &IndexSnapshot,
        query: &str,
        requested_k: usize,
    ) -> Result<Vec<RetrievalResult>, RetrieveError> {
        if snapshot.is_empty() || requested_k == 0 {
            debug!(target: "lustre::retrieve", products = snapshot.len(), requested_k, "nothing to search");
            return Ok(Vec::new());
        }

        let query_vector = embed_normalized(&self.embedder, query).await?;
        let k = self.candidate_count(requested_k);
        let neighbors = snapshot.index().search(&query_vector, k)?;

        let results = neighbors
            .into_iter()
            .map(|n| {
                let record = snapshot
                    .record(n.position)
                    .ok_or(RetrieveError::MissingRecord(n.position))?;
                Ok(RetrievalResult {
                    record: record.clone(),
                    score: n.score,
                })
            })
            .collect::<Result<Vec<_>, RetrieveError>>()?;

        debug!(
            target: "lustre::retrieve",
            build_id = snapshot.build_id(),
            candidates = results.len(),
            top_score = results.first().map(|r| r.score),
            "retrieved"
        );
        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("failed to embed query: {0}")]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("index position {0} has no catalog record")]
    MissingRecord(usize),
}
