//! Threshold and attribute constraints over ranked results.
//!
//! Filtering keeps the retriever's order and stops as soon as `limit`
//! survivors are found. It only sees the over-fetched candidate pool, so it may
//! return fewer than `limit` results; it never pads with rejected ones.

use serde::Deserialize;
use tracing::debug;

use crate::retriever::RetrievalResult;

pub const DEFAULT_MIN_SCORE: f32 = 0.3;

/// Each field is optional; `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConstraints {
    pub min_score: Option<f32>,
    /// Compared case-insensitively against the record's category.
    pub category: Option<String>,
    /// Bounds apply to the record's lowest price.
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl Default for FilterConstraints {
    fn default() -> Self {
        Self {
            min_score: Some(DEFAULT_MIN_SCORE),
            category: None,
            min_price: None,
            max_price: None,
        }
    }
}

impl FilterConstraints {
    /// No threshold, no attribute constraints.
    pub fn none() -> Self {
        Self {
            min_score: None,
            ..Self::default()
        }
    }

    pub fn admits(&self, result: &RetrievalResult) -> bool {
        if let Some(min) = self.min_score {
            if result.score.is_nan() || result.score < min {
                return false;
            }
        }
        let record = &result.record;
        if let Some(wanted) = self.category.as_deref() {
            match record.category.as_deref() {
                Some(category) if category.to_lowercase() == wanted.to_lowercase() => {}
                _ => return false,
            }
        }
        if self.min_price.is_some_and(|min| record.min_price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| record.min_price > max) {
            return false;
        }
        true
    }
}

/// At most `limit` results that pass `constraints`, in input order.
pub fn filter(
    results: Vec<RetrievalResult>,
    constraints: &FilterConstraints,
    limit: usize,
) -> Vec<RetrievalResult> {
    let candidates = results.len();
    let kept: Vec<_> = results
        .into_iter()
        .filter(|r| constraints.admits(r))
        .take(limit)
        .collect();
    debug!(target: "lustre::retrieve", candidates, kept = kept.len(), limit, "filtered");
    kept
}
