//! The index/catalog pair that every request reads, and the handle that swaps it.
//!
//! An [`IndexSnapshot`] is immutable and can only be constructed with equal
//! vector and record counts. A rebuild constructs a new one off to the side and
//! publishes it through [`SnapshotHandle::publish`]; requests hold the `Arc`
//! they started with until they finish.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, MutexGuard};

use crate::catalog::{CatalogSnapshot, ProductRecord};
use crate::store::{StoreError, VectorIndex};

/// Immutable pairing of a vector index with its positional catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    index: VectorIndex,
    catalog: CatalogSnapshot,
    build_id: u64,
}

impl IndexSnapshot {
    /// Pairs `index` with `catalog`. Fails unless both hold the same number of entries.
    pub fn new(
        index: VectorIndex,
        catalog: CatalogSnapshot,
        build_id: u64,
    ) -> Result<Self, SnapshotError> {
        if index.len() != catalog.len() {
            return Err(SnapshotError::InconsistentIndexState {
                vectors: index.len(),
                records: catalog.len(),
            });
        }
        Ok(Self {
            index,
            catalog,
            build_id,
        })
    }

    /// Nothing indexed yet. Searches against it return no results.
    pub fn empty(dimension: usize) -> Result<Self, SnapshotError> {
        Ok(Self {
            index: VectorIndex::new(dimension)?,
            catalog: CatalogSnapshot::default(),
            build_id: 0,
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn catalog(&self) -> &CatalogSnapshot {
        &self.catalog
    }

    /// Record at the same position as vector `position`.
    pub fn record(&self, position: usize) -> Option<&ProductRecord> {
        self.catalog.get(position)
    }

    /// Identifier stamped on both persisted artifacts of this build (0 for the empty snapshot).
    pub fn build_id(&self) -> u64 {
        self.build_id
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

/// Shared slot holding the live snapshot. Readers clone the `Arc` and drop the
/// lock immediately; the writer only ever replaces the pointer.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<IndexSnapshot>>,
    updates: Mutex<()>,
}

impl SnapshotHandle {
    pub fn new(initial: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            updates: Mutex::new(()),
        }
    }

    /// Serializes writers. Hold the guard across publish and persist so the
    /// order snapshots go live matches the order they reach disk. Readers
    /// never take it.
    pub async fn lock_updates(&self) -> MutexGuard<'_, ()> {
        self.updates.lock().await
    }

    /// The snapshot live at the time of the call.
    pub fn load(&self) -> Arc<IndexSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replaces the live snapshot and returns the one it superseded.
    pub fn publish(&self, next: impl Into<Arc<IndexSnapshot>>) -> Arc<IndexSnapshot> {
        let next = next.into();
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("inconsistent index state: {vectors} vectors but {records} catalog records")]
    InconsistentIndexState { vectors: usize, records: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    fn catalog(n: usize) -> CatalogSnapshot {
        let records = (0..n)
            .map(|i| record(i as i64, &format!("P{i}"), "Rings", 1.0))
            .collect();
        CatalogSnapshot::new(records).unwrap()
    }

    #[test]
    fn counts_must_match() {
        let index = VectorIndex::build(2, [[1.0_f32, 0.0], [0.0, 1.0]]).unwrap();
        assert!(IndexSnapshot::new(index.clone(), catalog(2), 1).is_ok());
        assert!(matches!(
            IndexSnapshot::new(index, catalog(3), 1),
            Err(SnapshotError::InconsistentIndexState { vectors: 2, records: 3 })
        ));
    }

    #[test]
    fn publish_swaps_without_touching_held_snapshots() {
        let handle = SnapshotHandle::new(IndexSnapshot::empty(2).unwrap());
        let before = handle.load();

        let index = VectorIndex::build(2, [[1.0_f32, 0.0]]).unwrap();
        let old = handle.publish(IndexSnapshot::new(index, catalog(1), 7).unwrap());

        assert!(Arc::ptr_eq(&before, &old));
        assert!(before.is_empty());
        assert_eq!(handle.load().len(), 1);
        assert_eq!(handle.load().build_id(), 7);
    }
}
