//! Index pipeline: load catalog → embed → normalize → build snapshot → publish → persist.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{embedding_text, CatalogError, CatalogSnapshot, CatalogSource};
use crate::config::IndexConfig;
use crate::embed::{normalize, EmbedError, Embedder};
use crate::persist::{load_snapshot, save_snapshot, PersistError};
use crate::snapshot::{IndexSnapshot, SnapshotError, SnapshotHandle};
use crate::store::{StoreError, VectorIndex};

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub success: bool,
    pub indexed: usize,
    pub build_id: u64,
    pub elapsed_ms: u64,
}

/// Reads the whole catalog and embeds it into a fresh snapshot. Nothing shared
/// is touched; the caller decides whether to publish the result.
pub async fn build_snapshot<S, E>(
    source: &S,
    embedder: &E,
    cfg: &IndexConfig,
) -> Result<IndexSnapshot, IndexError>
where
    S: CatalogSource + ?Sized,
    E: Embedder + ?Sized,
{
    let products = source.load_products().await?;
    if products.is_empty() {
        return Err(IndexError::EmptyCatalog);
    }
    let catalog = CatalogSnapshot::new(products)?;
    let texts: Vec<String> = catalog.iter().map(embedding_text).collect();

    let mut index = VectorIndex::new(cfg.dimension)?;
    for batch in texts.chunks(cfg.embed_batch_size.max(1)) {
        let vectors = embedder.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EmbedError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            }
            .into());
        }
        for v in &vectors {
            if v.is_empty() {
                return Err(EmbedError::Empty.into());
            }
            index.add(&normalize(v))?;
        }
        debug!(target: "lustre::index", embedded = index.len(), total = texts.len(), "embedded batch");
    }

    Ok(IndexSnapshot::new(index, catalog, new_build_id())?)
}

/// Builds a new snapshot, publishes it, then writes it to `persist_dir` if
/// one is given. On a build failure the live snapshot is left untouched. A
/// persist failure is reported after the new snapshot is already live.
///
/// Builds may run side by side; publish and persist are serialized per handle,
/// so the last snapshot published is also the pair on disk.
pub async fn rebuild<S, E>(
    handle: &SnapshotHandle,
    source: &S,
    embedder: &E,
    cfg: &IndexConfig,
    persist_dir: Option<&Path>,
) -> Result<RebuildReport, IndexError>
where
    S: CatalogSource + ?Sized,
    E: Embedder + ?Sized,
{
    let started = Instant::now();
    let snapshot = match build_snapshot(source, embedder, cfg).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            warn!(target: "lustre::index", error = %e, "rebuild failed, keeping current snapshot");
            return Err(e);
        }
    };
    let indexed = snapshot.len();
    let build_id = snapshot.build_id();

    let _updates = handle.lock_updates().await;
    let previous = handle.publish(Arc::clone(&snapshot));
    info!(
        target: "lustre::index",
        products = indexed,
        build_id,
        previous_build_id = previous.build_id(),
        "snapshot published"
    );

    if let Some(dir) = persist_dir {
        save_snapshot(dir, &snapshot)?;
    }

    Ok(RebuildReport {
        success: true,
        indexed,
        build_id,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Startup load. Missing artifacts (or no directory) give an empty snapshot;
/// a mismatched pair is an error and nothing should be served until a rebuild.
pub fn load_persisted(dir: Option<&Path>, dimension: usize) -> Result<IndexSnapshot, IndexError> {
    let Some(dir) = dir else {
        return Ok(IndexSnapshot::empty(dimension)?);
    };
    match load_snapshot(dir, dimension)? {
        Some(snapshot) => Ok(snapshot),
        None => {
            info!(target: "lustre::index", dir = %dir.display(), "no index on disk, starting empty");
            Ok(IndexSnapshot::empty(dimension)?)
        }
    }
}

/// Non-zero and strictly increasing within a process.
pub fn new_build_id() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(seen) => last = seen,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no products found in catalog")]
    EmptyCatalog,
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}
