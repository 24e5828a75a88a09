//! Dual-encoding persistence for tables.
//!
//! Every logical table is written twice: a Parquet file that programs read
//! back, and a CSV copy for people to open. The pair is written one file after
//! the other. A crash between the two leaves the CSV stale; the Parquet file
//! is the one that is read, so the divergence is cosmetic.

use super::record::ModelRecord;
use crate::config::SnapshotPair;
use crate::error::{RegistryError, Result, ResultExt as _};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Fixed column set of the canonical table, in storage order.
pub const MODEL_COLUMNS: &[&str] = &[
    "row_id",
    "id",
    "version",
    "name",
    "algorithm",
    "model_type",
    "programming_language",
    "metrics_json",
    "tags_json",
    "raw_payload_json",
    "source_filename",
    "created_at",
    "updated_at",
    "is_latest",
    "previous_version_id",
];

/// Write `df` to both files of `pair`, Parquet first.
///
/// Each file is written to a temporary sibling and renamed over the target,
/// so a reader (or a crash) only ever sees a complete old or new file.
pub fn persist(df: &mut DataFrame, pair: &SnapshotPair) -> Result<()> {
    write_replacing(&pair.parquet, |file| {
        ParquetWriter::new(file)
            .finish(df)
            .context("Failed to write Parquet snapshot")
            .map(|_size| ())
    })?;
    write_replacing(&pair.csv, |file| {
        CsvWriter::new(file)
            .include_header(true)
            .finish(df)
            .context("Failed to write CSV snapshot")
    })
}

fn write_replacing<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).context("Failed to create snapshot directory")?;

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all().context("Failed to flush snapshot")?;
    temp.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", target.display()))?;
    Ok(())
}

/// Read the columnar copy of a table, or `None` if it was never written.
pub fn read_parquet(path: &Path) -> Result<Option<DataFrame>> {
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .context("Failed to read Parquet snapshot")?;
    Ok(Some(df))
}

/// Encode canonical records into the fixed-schema frame.
pub fn records_to_frame(records: &[ModelRecord]) -> Result<DataFrame> {
    let n = records.len();
    let mut row_id = Vec::with_capacity(n);
    let mut id = Vec::with_capacity(n);
    let mut version = Vec::with_capacity(n);
    let mut name = Vec::with_capacity(n);
    let mut algorithm = Vec::with_capacity(n);
    let mut model_type = Vec::with_capacity(n);
    let mut language = Vec::with_capacity(n);
    let mut metrics = Vec::with_capacity(n);
    let mut tags = Vec::with_capacity(n);
    let mut payload = Vec::with_capacity(n);
    let mut source = Vec::with_capacity(n);
    let mut created_at = Vec::with_capacity(n);
    let mut updated_at = Vec::with_capacity(n);
    let mut is_latest = Vec::with_capacity(n);
    let mut previous = Vec::with_capacity(n);

    for r in records {
        row_id.push(Some(r.row_id.to_string()));
        id.push(Some(r.id.clone()));
        version.push(Some(i64::from(r.version)));
        name.push(r.name.clone());
        algorithm.push(r.algorithm.clone());
        model_type.push(r.model_type.clone());
        language.push(r.programming_language.clone());
        metrics.push(Some(serde_json::to_string(&r.metrics)?));
        tags.push(Some(serde_json::to_string(&r.tags)?));
        payload.push(Some(serde_json::to_string(&r.raw_payload)?));
        source.push(r.source_filename.clone());
        created_at.push(Some(r.created_at.to_rfc3339()));
        updated_at.push(Some(r.updated_at.to_rfc3339()));
        is_latest.push(Some(r.is_latest));
        previous.push(r.previous_version_id.map(|u| u.to_string()));
    }

    let columns = vec![
        Column::new("row_id".into(), row_id),
        Column::new("id".into(), id),
        Column::new("version".into(), version),
        Column::new("name".into(), name),
        Column::new("algorithm".into(), algorithm),
        Column::new("model_type".into(), model_type),
        Column::new("programming_language".into(), language),
        Column::new("metrics_json".into(), metrics),
        Column::new("tags_json".into(), tags),
        Column::new("raw_payload_json".into(), payload),
        Column::new("source_filename".into(), source),
        Column::new("created_at".into(), created_at),
        Column::new("updated_at".into(), updated_at),
        Column::new("is_latest".into(), is_latest),
        Column::new("previous_version_id".into(), previous),
    ];

    Ok(DataFrame::new(columns)?)
}

/// Decode the canonical frame back into records.
pub fn frame_to_records(df: &DataFrame) -> Result<Vec<ModelRecord>> {
    let row_id = string_column(df, "row_id")?;
    let id = string_column(df, "id")?;
    let version = int_column(df, "version")?;
    let name = string_column(df, "name")?;
    let algorithm = string_column(df, "algorithm")?;
    let model_type = string_column(df, "model_type")?;
    let language = string_column(df, "programming_language")?;
    let metrics = string_column(df, "metrics_json")?;
    let tags = string_column(df, "tags_json")?;
    let payload = string_column(df, "raw_payload_json")?;
    let source = string_column(df, "source_filename")?;
    let created_at = string_column(df, "created_at")?;
    let updated_at = string_column(df, "updated_at")?;
    let is_latest = bool_column(df, "is_latest")?;
    let previous = string_column(df, "previous_version_id")?;

    (0..df.height())
        .map(|i| -> Result<ModelRecord> {
            let row_id = required(&row_id, i, "row_id")?;
            let id = required(&id, i, "id")?;
            let version = version.get(i).copied().flatten().ok_or_else(|| {
                RegistryError::Storage(format!("Row {i}: missing version"))
            })?;

            Ok(ModelRecord {
                row_id: parse_uuid(&row_id)?,
                id,
                version: u32::try_from(version).map_err(|_err| {
                    RegistryError::Storage(format!("Row {i}: invalid version {version}"))
                })?,
                name: cell(&name, i),
                algorithm: cell(&algorithm, i),
                model_type: cell(&model_type, i),
                programming_language: cell(&language, i),
                metrics: json_cell(&metrics, i)?,
                tags: json_cell(&tags, i)?,
                raw_payload: json_cell(&payload, i)?,
                source_filename: cell(&source, i),
                created_at: parse_time(&required(&created_at, i, "created_at")?)?,
                updated_at: parse_time(&required(&updated_at, i, "updated_at")?)?,
                is_latest: is_latest.get(i).copied().flatten().unwrap_or(false),
                previous_version_id: cell(&previous, i).map(|s| parse_uuid(&s)).transpose()?,
            })
        })
        .collect()
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)
        .with_context(|| format!("Canonical table is missing column '{name}'"))?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = df
        .column(name)
        .with_context(|| format!("Canonical table is missing column '{name}'"))?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn bool_column(df: &DataFrame, name: &str) -> Result<Vec<Option<bool>>> {
    let series = df
        .column(name)
        .with_context(|| format!("Canonical table is missing column '{name}'"))?
        .as_materialized_series()
        .cast(&DataType::Boolean)?;
    Ok(series.bool()?.into_iter().collect())
}

fn cell(values: &[Option<String>], i: usize) -> Option<String> {
    values.get(i).cloned().flatten()
}

fn required(values: &[Option<String>], i: usize, column: &str) -> Result<String> {
    cell(values, i).ok_or_else(|| RegistryError::Storage(format!("Row {i}: missing {column}")))
}

fn json_cell<T>(values: &[Option<String>], i: usize) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match cell(values, i) {
        Some(raw) if !raw.is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(T::default()),
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| RegistryError::Storage(format!("Invalid row id '{raw}': {e}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RegistryError::Storage(format!("Invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::ModelSubmission;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Result<ModelRecord> {
        let sub = ModelSubmission::from_value(json!({
            "name": "fraud-detector",
            "algorithm": "XGBoost",
            "modelType": "classification",
            "metrics": {"accuracy": 0.93},
            "tags": ["prod"],
            "hyper": {"depth": 6},
        }))?;
        Ok(ModelRecord::first_version("m-1".to_owned(), sub))
    }

    #[test]
    fn test_empty_frame_has_fixed_schema() -> Result<()> {
        let df = records_to_frame(&[])?;
        assert_eq!(df.height(), 0);
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, MODEL_COLUMNS);
        Ok(())
    }

    #[test]
    fn test_frame_preserves_nested_fields() -> Result<()> {
        let record = sample()?;
        let df = records_to_frame(std::slice::from_ref(&record))?;
        let decoded = frame_to_records(&df)?;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].raw_payload.get("hyper"), Some(&json!({"depth": 6})));
        assert_eq!(decoded[0].metrics.get("accuracy"), Some(&0.93));
        assert_eq!(decoded[0].row_id, record.row_id);
        Ok(())
    }

    #[test]
    fn test_persist_writes_both_encodings() -> Result<()> {
        let temp = TempDir::new()?;
        let pair = crate::config::StoragePaths::new(temp.path()).models;
        let mut df = records_to_frame(&[sample()?])?;
        persist(&mut df, &pair)?;

        assert!(pair.parquet.exists());
        let csv = fs::read_to_string(&pair.csv)?;
        assert!(csv.starts_with("row_id,id,version"));
        assert!(csv.contains("fraud-detector"));

        let back = read_parquet(&pair.parquet)?.expect("snapshot was just written");
        assert_eq!(back.height(), 1);
        Ok(())
    }

    #[test]
    fn test_read_missing_parquet_is_none() -> Result<()> {
        let temp = TempDir::new()?;
        assert!(read_parquet(&temp.path().join("absent.parquet"))?.is_none());
        Ok(())
    }
}
