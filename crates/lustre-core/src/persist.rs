//! Saving and loading a snapshot as two co-located artifacts.
//!
//! `vectors.json` holds the index, `catalog.json` the records. Both carry the
//! build id of the snapshot that wrote them; a load only succeeds when both
//! files exist, agree on the build id, and agree on the entry count.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{CatalogError, CatalogSnapshot, ProductRecord};
use crate::snapshot::{IndexSnapshot, SnapshotError};
use crate::store::{StoreError, VectorIndex};

pub const VECTORS_FILE: &str = "vectors.json";
pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Serialize)]
struct VectorsOut<'a> {
    build_id: u64,
    index: &'a VectorIndex,
}

#[derive(Deserialize)]
struct VectorsIn {
    build_id: u64,
    index: VectorIndex,
}

#[derive(Serialize)]
struct CatalogOut<'a> {
    build_id: u64,
    records: &'a CatalogSnapshot,
}

#[derive(Deserialize)]
struct CatalogIn {
    build_id: u64,
    records: Vec<ProductRecord>,
}

/// Writes both artifacts into `dir` (created if missing). Each file goes to a
/// temporary name first and is renamed into place, catalog before vectors.
/// Callers writing the same `dir` concurrently must serialize, see
/// [`SnapshotHandle::lock_updates`](crate::snapshot::SnapshotHandle::lock_updates).
pub fn save_snapshot(dir: &Path, snapshot: &IndexSnapshot) -> Result<(), PersistError> {
    fs::create_dir_all(dir).map_err(|e| PersistError::Io(dir.to_path_buf(), e))?;

    let catalog = CatalogOut {
        build_id: snapshot.build_id(),
        records: snapshot.catalog(),
    };
    let vectors = VectorsOut {
        build_id: snapshot.build_id(),
        index: snapshot.index(),
    };
    let build_id = snapshot.build_id();
    write_json(&dir.join(CATALOG_FILE), &catalog, build_id)?;
    write_json(&dir.join(VECTORS_FILE), &vectors, build_id)?;

    info!(
        target: "lustre::persist",
        dir = %dir.display(),
        build_id = snapshot.build_id(),
        products = snapshot.len(),
        "snapshot saved"
    );
    Ok(())
}

/// Loads the pair from `dir`. `Ok(None)` when neither artifact exists (nothing
/// was ever built); any partial or mismatched pair is an error.
pub fn load_snapshot(dir: &Path, dimension: usize) -> Result<Option<IndexSnapshot>, PersistError> {
    let vectors_path = dir.join(VECTORS_FILE);
    let catalog_path = dir.join(CATALOG_FILE);

    match (vectors_path.is_file(), catalog_path.is_file()) {
        (false, false) => {
            debug!(target: "lustre::persist", dir = %dir.display(), "no persisted snapshot");
            return Ok(None);
        }
        (true, false) => return Err(PersistError::InconsistentIndexState(format!(
            "{} exists without {}",
            VECTORS_FILE, CATALOG_FILE
        ))),
        (false, true) => return Err(PersistError::InconsistentIndexState(format!(
            "{} exists without {}",
            CATALOG_FILE, VECTORS_FILE
        ))),
        (true, true) => {}
    }

    let vectors: VectorsIn = read_json(&vectors_path)?;
    let catalog: CatalogIn = read_json(&catalog_path)?;

    if vectors.build_id != catalog.build_id {
        return Err(PersistError::InconsistentIndexState(format!(
            "build id {} in {} does not match build id {} in {}",
            vectors.build_id, VECTORS_FILE, catalog.build_id, CATALOG_FILE
        )));
    }
    if !vectors.index.is_well_formed() {
        return Err(PersistError::InconsistentIndexState(format!(
            "{VECTORS_FILE} does not hold a whole number of vectors"
        )));
    }
    if vectors.index.dimension() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: vectors.index.dimension(),
        }
        .into());
    }

    let records = CatalogSnapshot::new(catalog.records)?;
    let snapshot = IndexSnapshot::new(vectors.index, records, vectors.build_id)?;
    info!(
        target: "lustre::persist",
        dir = %dir.display(),
        build_id = snapshot.build_id(),
        products = snapshot.len(),
        "snapshot loaded"
    );
    Ok(Some(snapshot))
}

/// Temp name carries the build id, so two writers never share one.
fn write_json<T: Serialize>(path: &Path, value: &T, build_id: u64) -> Result<(), PersistError> {
    let tmp = path.with_extension(format!("{build_id}.tmp"));
    let body = serde_json::to_vec(value).map_err(|e| PersistError::Json(path.to_path_buf(), e))?;
    fs::write(&tmp, body).map_err(|e| PersistError::Io(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| PersistError::Io(path.to_path_buf(), e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, PersistError> {
    let raw = fs::read(path).map_err(|e| PersistError::Io(path.to_path_buf(), e))?;
    serde_json::from_slice(&raw).map_err(|e| PersistError::Json(path.to_path_buf(), e))
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error for {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("invalid json in {0}: {1}")]
    Json(PathBuf, serde_json::Error),
    #[error("inconsistent index state: {0}")]
    InconsistentIndexState(String),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("persisted catalog is invalid: {0}")]
    Catalog(#[from] CatalogError),
}

impl PersistError {
    /// True when the artifacts on disk disagree with each other. Serving must
    /// wait for a rebuild.
    pub fn is_inconsistent(&self) -> bool {
        matches!(
            self,
            Self::InconsistentIndexState(_)
                | Self::Snapshot(SnapshotError::InconsistentIndexState { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    fn snapshot(build_id: u64) -> IndexSnapshot {
        let catalog = CatalogSnapshot::new(vec![
            record(1, "Gold Ring", "Rings", 15_000_000.0),
            record(2, "Silver Bracelet", "Bracelets", 900_000.0),
        ])
        .unwrap();
        let index = VectorIndex::build(2, [[1.0_f32, 0.0], [0.0, 1.0]]).unwrap();
        IndexSnapshot::new(index, catalog, build_id).unwrap()
    }

    #[test]
    fn save_then_load_restores_pair() {
        let dir = tempfile::tempdir().unwrap();
        let original = snapshot(42);
        save_snapshot(dir.path(), &original).unwrap();
        let loaded = load_snapshot(dir.path(), 2).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.index().len(), loaded.catalog().len());
    }

    #[test]
    fn nothing_on_disk_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(dir.path(), 2).unwrap().is_none());
    }

    #[test]
    fn lone_artifact_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &snapshot(1)).unwrap();
        fs::remove_file(dir.path().join(CATALOG_FILE)).unwrap();
        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(err.is_inconsistent(), "{err}");
    }

    #[test]
    fn artifacts_from_different_builds_are_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &snapshot(1)).unwrap();
        save_snapshot(other.path(), &snapshot(2)).unwrap();
        fs::copy(other.path().join(VECTORS_FILE), dir.path().join(VECTORS_FILE)).unwrap();
        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(err.is_inconsistent(), "{err}");
    }

    #[test]
    fn count_mismatch_is_inconsistent_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &snapshot(5)).unwrap();
        let extra = serde_json::json!({
            "build_id": 5,
            "records": [
                record(1, "Gold Ring", "Rings", 15_000_000.0),
                record(2, "Silver Bracelet", "Bracelets", 900_000.0),
                record(3, "Pearl Earrings", "Earrings", 2_000_000.0),
            ],
        });
        fs::write(dir.path().join(CATALOG_FILE), extra.to_string()).unwrap();
        let err = load_snapshot(dir.path(), 2).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Snapshot(SnapshotError::InconsistentIndexState { vectors: 2, records: 3 })
        ));
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        save_snapshot(dir.path(), &snapshot(1)).unwrap();
        assert!(matches!(
            load_snapshot(dir.path(), 384),
            Err(PersistError::Store(StoreError::DimensionMismatch { expected: 384, actual: 2 }))
        ));
    }
}
