//! Exact inner-product vector index. Vectors are stored flat, row-major.
//!
//! The index never normalizes: callers hand it unit-length vectors (see
//! [crate::embed::normalize]) so that inner product equals cosine similarity.
//! Position `i` is the insertion order and is what the catalog snapshot is keyed on.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Embedding dimension of the default model (all-MiniLM-L6-v2 / `all-minilm`).
pub const DEFAULT_DIMENSION: usize = 384;

/// One search hit: the position of the stored vector and its inner product with the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// In-memory flat index with exact (brute-force) nearest-neighbor search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Empty index accepting vectors of exactly `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, StoreError> {
        if dimension == 0 {
            return Err(StoreError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Builds an index from an ordered sequence of vectors. Order is preserved:
    /// the `i`th vector is stored at position `i`.
    pub fn build<I, V>(dimension: usize, vectors: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
    {
        let mut index = Self::new(dimension)?;
        for v in vectors {
            index.add(v.as_ref())?;
        }
        Ok(index)
    }

    /// Appends one vector at the next position.
    pub fn add(&mut self, vector: &[f32]) -> Result<(), StoreError> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Returns up to `k` neighbors of `query`, highest score first.
    /// Equal scores keep insertion order (lower position first).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        self.check_dimension(query)?;
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                score: dot(query, v),
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_by(rank_order);
        Ok(scored)
    }

    /// Vector stored at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dimension).nth(position)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len().checked_div(self.dimension).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when the flat buffer holds a whole number of vectors. Only a
    /// deserialized index can violate this.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.dimension > 0 && self.data.len() % self.dimension == 0
    }

    fn check_dimension(&self, v: &[f32]) -> Result<(), StoreError> {
        if v.len() == self.dimension {
            Ok(())
        } else {
            Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            })
        }
    }
}

/// Descending score, then ascending position. A total order, so partial
/// selection followed by a sort yields the same prefix as a full stable sort.
fn rank_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index dimension must be greater than zero")]
    ZeroDimension,
}
