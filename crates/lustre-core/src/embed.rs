//! The embedding step: text → fixed-dimension vector → unit length.
//!
//! Embedding itself is an external collaborator behind [`Embedder`]; this
//! module owns the L2 normalization that must happen before a vector is
//! inserted into or used to query a [`VectorIndex`](crate::store::VectorIndex).

use async_trait::async_trait;

/// Anything that turns text into embedding vectors. Must be deterministic for
/// a given model so index and query vectors live in the same space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed many strings. Returns one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Returns `v` scaled to unit L2 length. A zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 || !norm.is_finite() {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Embed `text` and normalize the result in one step.
pub async fn embed_normalized<E>(embedder: &E, text: &str) -> Result<Vec<f32>, EmbedError>
where
    E: Embedder + ?Sized,
{
    let v = embedder.embed(text).await?;
    if v.is_empty() {
        return Err(EmbedError::Empty);
    }
    Ok(normalize(&v))
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding backend failed: {0}")]
    Backend(String),
    #[error("embedding backend returned an empty vector")]
    Empty,
    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}
