//! Master export rebuild.
//!
//! Flattens every canonical record into one wide row and writes two derived
//! tables under `exports/`:
//!
//! - `master_all`: one row per stored version
//! - `master_latest`: one row per identity, its highest version only
//!
//! Both are caches. They are regenerated wholesale from the canonical table
//! and can be deleted at any time.
//!
//! ## Row layout
//!
//! | Column | Source |
//! |---|---|
//! | `id`, `version`, `name`, ... | canonical columns, with payload fallbacks |
//! | `metric.<name>` | one column per metric |
//! | `payload.<path>` | the flattened raw submission |

pub mod table;

use crate::config::StoragePaths;
use crate::error::{Result, ResultExt as _};
use crate::flatten::flatten;
use crate::store::record::{LANGUAGE_ALIASES, MODEL_TYPE_ALIASES, first_alias};
use crate::store::{ModelRecord, RecordStore, latest_of, snapshot};
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// A flattened record: dotted column name to scalar value.
pub type DerivedRow = BTreeMap<String, Value>;

/// Columns present in every derived table, in order.
pub const BASE_COLUMNS: &[&str] = &[
    "id",
    "row_id",
    "version",
    "name",
    "algorithm",
    "model_type",
    "programming_language",
    "tags",
    "created_at",
    "updated_at",
    "is_latest",
    "previous_version_id",
    "source_filename",
];

pub const METRIC_PREFIX: &str = "metric.";
pub const PAYLOAD_PREFIX: &str = "payload.";

/// Row counts written by a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RebuildReport {
    pub all_rows: usize,
    pub latest_rows: usize,
}

/// Regenerate both master exports from the canonical table.
///
/// An empty or missing canonical table produces empty exports that still
/// carry the base columns.
pub fn rebuild(store: &RecordStore) -> Result<RebuildReport> {
    let records = store.read_all()?;
    let paths = store.paths();

    let latest = latest_of(&records);
    let latest_ids: HashSet<_> = latest.iter().map(|r| r.row_id).collect();

    let all_rows: Vec<DerivedRow> = records
        .iter()
        .map(|r| normalize_record(r, latest_ids.contains(&r.row_id)))
        .collect();
    write_export(&all_rows, &paths.master_all)?;

    let latest_rows: Vec<DerivedRow> = latest.iter().map(|r| normalize_record(r, true)).collect();
    write_export(&latest_rows, &paths.master_latest)?;

    let report = RebuildReport {
        all_rows: all_rows.len(),
        latest_rows: latest_rows.len(),
    };
    tracing::info!(
        all_rows = report.all_rows,
        latest_rows = report.latest_rows,
        "Rebuilt master exports"
    );
    Ok(report)
}

fn write_export(rows: &[DerivedRow], pair: &crate::config::SnapshotPair) -> Result<()> {
    let mut df = table::rows_to_frame(rows)?;
    snapshot::persist(&mut df, pair)
}

/// Flatten one canonical record into a derived row.
///
/// Descriptive fields come from the canonical column when set. Rows written
/// by older producers may have left a column empty; those fall back to the
/// payload, trying the newer key name before the older one.
pub fn normalize_record(record: &ModelRecord, is_latest: bool) -> DerivedRow {
    let payload = &record.raw_payload;
    let mut row = DerivedRow::new();

    row.insert("id".to_owned(), Value::from(record.id.as_str()));
    row.insert("row_id".to_owned(), Value::from(record.row_id.to_string()));
    row.insert("version".to_owned(), Value::from(record.version));
    row.insert(
        "name".to_owned(),
        resolve(record.name.as_deref(), payload, &["name"]),
    );
    row.insert(
        "algorithm".to_owned(),
        resolve(record.algorithm.as_deref(), payload, &["algorithm"]),
    );
    row.insert(
        "model_type".to_owned(),
        resolve(record.model_type.as_deref(), payload, MODEL_TYPE_ALIASES),
    );
    row.insert(
        "programming_language".to_owned(),
        resolve(
            record.programming_language.as_deref(),
            payload,
            LANGUAGE_ALIASES,
        ),
    );
    row.insert(
        "tags".to_owned(),
        if record.tags.is_empty() {
            Value::Null
        } else {
            Value::from(record.tags.join(","))
        },
    );
    row.insert(
        "created_at".to_owned(),
        Value::from(record.created_at.to_rfc3339()),
    );
    row.insert(
        "updated_at".to_owned(),
        Value::from(record.updated_at.to_rfc3339()),
    );
    row.insert("is_latest".to_owned(), Value::Bool(is_latest));
    row.insert(
        "previous_version_id".to_owned(),
        record
            .previous_version_id
            .map_or(Value::Null, |u| Value::from(u.to_string())),
    );
    row.insert(
        "source_filename".to_owned(),
        record
            .source_filename
            .as_deref()
            .map_or(Value::Null, Value::from),
    );

    for (name, value) in &record.metrics {
        row.insert(format!("{METRIC_PREFIX}{name}"), Value::from(*value));
    }

    for (path, value) in flatten(payload) {
        row.insert(format!("{PAYLOAD_PREFIX}{path}"), value);
    }

    row
}

fn resolve(column: Option<&str>, payload: &Map<String, Value>, aliases: &[&str]) -> Value {
    column
        .filter(|s| !s.is_empty())
        .or_else(|| first_alias(payload, aliases))
        .map_or(Value::Null, Value::from)
}

/// The persisted `master_latest` export, or `None` if it was never written
/// or predates the last write to the canonical table.
pub fn read_latest_export(paths: &StoragePaths) -> Result<Option<DataFrame>> {
    let path = &paths.master_latest.parquet;
    if !path.exists() {
        return Ok(None);
    }
    if !export_is_current(path, &paths.models.parquet)? {
        tracing::debug!(path = %path.display(), "Latest export is older than the canonical table");
        return Ok(None);
    }
    let df = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?;
    Ok(Some(df))
}

fn export_is_current(export: &Path, canonical: &Path) -> Result<bool> {
    let exported_at = fs::metadata(export)
        .and_then(|m| m.modified())
        .context("Failed to stat latest export")?;
    match fs::metadata(canonical).and_then(|m| m.modified()) {
        // Same-tick timestamps are ambiguous and count as stale
        Ok(written_at) => Ok(exported_at > written_at),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e).context("Failed to stat canonical table"),
    }
}
