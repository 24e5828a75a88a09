//! Canonical record store.
//!
//! The whole table lives in one Parquet snapshot (plus a CSV copy). There is
//! no append in the file sense: every mutation reads the full table, changes
//! it in memory, and rewrites both files through [`snapshot::persist`].
//!
//! Two mutation contracts exist side by side and must not be confused:
//!
//! - [`RecordStore::patch_fields`] edits fields in place on every row of an
//!   identity, history included. It never creates a version.
//! - [`RecordStore::append_new_version`] adds a row and clears `is_latest` on
//!   the identity's older rows. This is how the service versions a model.
//!
//! No locking is done. Two processes (or threads) writing at once can each
//! read the same table and the second rewrite drops the first one's row.
//!
//! ```no_run
//! use model_registry::config::StoragePaths;
//! use model_registry::store::{ModelRecord, ModelSubmission, RecordStore};
//! use std::path::Path;
//!
//! # fn example() -> model_registry::error::Result<()> {
//! let store = RecordStore::new(StoragePaths::new(Path::new("data")));
//! store.initialize()?;
//!
//! let submission = ModelSubmission::from_json_str(r#"{"name": "churn"}"#)?;
//! store.append(ModelRecord::first_version("churn-1".to_owned(), submission))?;
//! assert_eq!(store.read_all()?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod record;
pub mod resolver;
pub mod snapshot;

pub use record::{ModelRecord, ModelSubmission, RecordPatch};
pub use resolver::{history_of, latest_for, latest_of};

use crate::config::StoragePaths;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RecordStore {
    paths: StoragePaths,
}

impl RecordStore {
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Create an empty canonical snapshot if either file is missing.
    pub fn initialize(&self) -> Result<()> {
        let pair = &self.paths.models;
        if pair.parquet.exists() && pair.csv.exists() {
            return Ok(());
        }
        // Keep existing rows if only the CSV copy was lost
        let records = self.read_all()?;
        tracing::info!(
            path = %pair.parquet.display(),
            rows = records.len(),
            "Initializing canonical snapshot"
        );
        self.persist(&records)
    }

    /// Full canonical table; empty when no snapshot exists yet.
    pub fn read_all(&self) -> Result<Vec<ModelRecord>> {
        match snapshot::read_parquet(&self.paths.models.parquet)? {
            Some(df) => snapshot::frame_to_records(&df),
            None => Ok(Vec::new()),
        }
    }

    pub fn append(&self, record: ModelRecord) -> Result<()> {
        let mut records = self.read_all()?;
        tracing::debug!(id = %record.id, version = record.version, "Appending record");
        records.push(record);
        self.persist(&records)
    }

    /// Append `record` as its identity's newest version, clearing `is_latest`
    /// on the identity's other rows in the same rewrite.
    pub fn append_new_version(&self, mut record: ModelRecord) -> Result<()> {
        let mut records = self.read_all()?;
        for existing in records.iter_mut().filter(|r| r.id == record.id) {
            existing.is_latest = false;
        }
        record.is_latest = true;
        tracing::debug!(id = %record.id, version = record.version, "Appending new version");
        records.push(record);
        self.persist(&records)
    }

    /// Apply `patch` to every row with this identity. Returns rows matched.
    /// An empty patch matches without rewriting the snapshot.
    pub fn patch_fields(&self, id: &str, patch: &RecordPatch) -> Result<usize> {
        let mut records = self.read_all()?;
        if patch.is_empty() {
            return Ok(records.iter().filter(|r| r.id == id).count());
        }
        let mut touched = 0;
        for record in records.iter_mut().filter(|r| r.id == id) {
            patch.apply(record);
            touched += 1;
        }
        if touched > 0 {
            self.persist(&records)?;
        }
        Ok(touched)
    }

    /// Delete every version of `id`. Returns rows removed.
    pub fn remove(&self, id: &str) -> Result<usize> {
        let mut records = self.read_all()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records)?;
        }
        Ok(removed)
    }

    /// First row in table order with this identity. Not version-aware.
    pub fn get_one(&self, id: &str) -> Result<Option<ModelRecord>> {
        Ok(self.read_all()?.into_iter().find(|r| r.id == id))
    }

    fn persist(&self, records: &[ModelRecord]) -> Result<()> {
        let mut df = snapshot::records_to_frame(records)?;
        snapshot::persist(&mut df, &self.paths.models)
    }
}
