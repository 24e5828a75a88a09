//! Registry operations consumed by adapters (CLI, HTTP, scripts).
//!
//! [`ModelService`] owns the store handle and the configuration. Every write
//! goes straight to the canonical snapshot and then, when
//! `rebuild_on_write` is set, regenerates the master exports. A failed
//! rebuild is logged and never reported to the writer: the canonical write
//! has already succeeded and the exports can be rebuilt later.

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result, ResultExt as _};
use crate::insights::{self, InsightsSnapshot, ModelSummary};
use crate::master::{self, RebuildReport};
use crate::store::{ModelRecord, ModelSubmission, RecordStore, history_of, latest_for, latest_of};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Outcome of [`ModelService::ingest_dir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Identities created, in file-name order
    pub created: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ModelService {
    store: RecordStore,
    config: RegistryConfig,
}

impl ModelService {
    /// Open the registry rooted at `config.data_dir`, creating an empty
    /// canonical snapshot when none exists.
    pub fn open(config: RegistryConfig) -> Result<Self> {
        let store = RecordStore::new(config.paths());
        store.initialize()?;
        tracing::info!(data_dir = %config.data_dir.display(), "Opened model registry");
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Store a submission as version 1 of a new identity.
    ///
    /// A missing `id` gets a random UUID. An `id` that already exists is
    /// rejected; new versions go through [`Self::update`].
    pub fn create(&self, submission: ModelSubmission) -> Result<ModelRecord> {
        let record = self.insert(submission)?;
        self.rebuild_after_write();
        Ok(record)
    }

    /// Create from a `.json` file; its file name is kept as `source_filename`.
    pub fn create_from_file(&self, path: &Path) -> Result<ModelRecord> {
        let submission = read_submission(path)?;
        self.create(submission)
    }

    /// Create one model per `*.json` file in `dir`, in file-name order.
    ///
    /// Files failing validation are skipped and reported. Storage errors
    /// abort the ingest. The exports are rebuilt once at the end.
    pub fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        {
            let path = entry
                .with_context(|| format!("Failed to list directory: {}", dir.display()))?
                .path();
            if path.is_file() && has_json_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        let mut report = IngestReport::default();
        for path in &files {
            let file = display_name(path);
            match read_submission(path).and_then(|s| self.insert(s)) {
                Ok(record) => report.created.push(record.id),
                Err(e) if e.is_validation() => {
                    tracing::warn!(file = %file, "Skipping submission: {e}");
                    report.skipped.push(SkippedFile {
                        file,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            dir = %dir.display(),
            "Ingested directory"
        );
        if !report.created.is_empty() {
            self.rebuild_after_write();
        }
        Ok(report)
    }

    /// Latest version of `id`, or exactly `version` when given.
    pub fn read(&self, id: &str, version: Option<u32>) -> Result<ModelRecord> {
        let records = self.store.read_all()?;
        let found = match version {
            None => latest_for(&records, id).cloned(),
            Some(v) => records.into_iter().find(|r| r.id == id && r.version == v),
        };
        found.ok_or_else(|| RegistryError::not_found(id, version))
    }

    /// Every version of `id`, oldest first.
    pub fn history(&self, id: &str) -> Result<Vec<ModelRecord>> {
        let records = self.store.read_all()?;
        let rows: Vec<ModelRecord> = history_of(&records, id).into_iter().cloned().collect();
        if rows.is_empty() {
            return Err(RegistryError::not_found(id, None));
        }
        Ok(rows)
    }

    /// Store `submission` as the next version of `id`.
    ///
    /// Full replacement: nothing is carried over from the previous version
    /// except identity and `created_at`.
    pub fn update(&self, id: &str, submission: ModelSubmission) -> Result<ModelRecord> {
        if let Some(body_id) = submission.id.as_deref()
            && body_id != id
        {
            return Err(RegistryError::validation(format!(
                "Submission id '{body_id}' does not match '{id}'"
            )));
        }

        let records = self.store.read_all()?;
        let current = latest_for(&records, id).ok_or_else(|| RegistryError::not_found(id, None))?;
        let first_created_at = history_of(&records, id)
            .first()
            .map_or(current.created_at, |r| r.created_at);

        let record = ModelRecord::next_version(current, first_created_at, submission);
        self.store.append_new_version(record.clone())?;
        tracing::info!(id = %record.id, version = record.version, "Updated model");

        self.rebuild_after_write();
        Ok(record)
    }

    /// Update from a `.json` file; its file name is kept as `source_filename`.
    pub fn update_from_file(&self, id: &str, path: &Path) -> Result<ModelRecord> {
        let submission = read_submission(path)?;
        self.update(id, submission)
    }

    /// All stored rows, or only the latest version of each identity.
    pub fn list(&self, latest_only: bool) -> Result<Vec<ModelRecord>> {
        let records = self.store.read_all()?;
        Ok(if latest_only {
            latest_of(&records)
        } else {
            records
        })
    }

    /// Remove every version of `id`. Returns the number of rows removed.
    pub fn delete(&self, id: &str) -> Result<usize> {
        let removed = self.store.remove(id)?;
        if removed == 0 {
            return Err(RegistryError::not_found(id, None));
        }
        tracing::info!(id, removed, "Deleted model");
        self.rebuild_after_write();
        Ok(removed)
    }

    pub fn summary(&self) -> Result<ModelSummary> {
        insights::compute_summary(&self.store)
    }

    /// Dashboard statistics. The `master_latest` export is trusted only
    /// while writes keep it rebuilt; otherwise the canonical table is read.
    pub fn insights(&self) -> Result<InsightsSnapshot> {
        insights::compute_insights(&self.store, self.config.rebuild_on_write)
    }

    pub fn export_insights(&self) -> Result<InsightsSnapshot> {
        insights::export_insights(&self.store, self.config.rebuild_on_write)
    }

    /// Regenerate the master exports now. Unlike the write-triggered rebuild,
    /// failures are returned.
    pub fn rebuild(&self) -> Result<RebuildReport> {
        master::rebuild(&self.store)
    }

    fn insert(&self, submission: ModelSubmission) -> Result<ModelRecord> {
        let id = submission
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let records = self.store.read_all()?;
        if records.iter().any(|r| r.id == id) {
            return Err(RegistryError::validation(format!(
                "Model already exists: {id}"
            )));
        }

        let record = ModelRecord::first_version(id, submission);
        self.store.append(record.clone())?;
        tracing::info!(id = %record.id, "Created model");
        Ok(record)
    }

    fn rebuild_after_write(&self) {
        if !self.config.rebuild_on_write {
            return;
        }
        if let Err(e) = master::rebuild(&self.store) {
            tracing::warn!("Master export rebuild failed after write: {e}");
        }
    }
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn read_submission(path: &Path) -> Result<ModelSubmission> {
    if !has_json_extension(path) {
        return Err(RegistryError::validation(format!(
            "Only .json files are accepted: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(ModelSubmission::from_json_str(&content)?.with_source_filename(display_name(path)))
}
