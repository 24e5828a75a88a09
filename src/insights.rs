//! Dashboard statistics over the latest version of every model.
//!
//! [`compute_insights`] aggregates the `master_latest` frame with polars. The
//! frame is read from the export when that is current and otherwise rebuilt
//! in memory from the canonical table. With no data at all it returns a
//! zeroed snapshot rather than an error.
//!
//! [`compute_summary`] is the older, narrower report: plain frequency maps
//! over a handful of descriptive fields.

use crate::error::{Result, ResultExt as _};
use crate::master::{self, DerivedRow, METRIC_PREFIX, table};
use crate::store::{ModelRecord, RecordStore, latest_of};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Metric names averaged in [`InsightsSnapshot::metric_averages`].
pub const KNOWN_METRICS: &[&str] = &[
    "accuracy",
    "precision",
    "recall",
    "f1",
    "roc_auc",
    "rmse",
    "mae",
    "mape",
    "bleu",
    "rouge",
    "perplexity",
];

/// How many languages [`InsightsSnapshot::top_languages`] keeps.
pub const TOP_LANGUAGES: usize = 5;

const NAME_KEYS: &[&str] = &["name", "payload.name"];
const ALGORITHM_KEYS: &[&str] = &["algorithm", "payload.algorithm"];
const TYPE_KEYS: &[&str] = &["model_type", "payload.modelType", "payload.model_type"];
const LANGUAGE_KEYS: &[&str] = &[
    "programming_language",
    "payload.scoreCodeType",
    "payload.programming_language",
];

// Resolved core columns and the group count
const NAME: &str = "name";
const ALGORITHM: &str = "algorithm";
const MODEL_TYPE: &str = "model_type";
const LANGUAGE: &str = "language";
const COUNT: &str = "count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageCount {
    pub language: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsSnapshot {
    pub total_count: usize,
    pub count_by_type: BTreeMap<String, usize>,
    pub most_used_algorithm: Option<String>,
    pub top_languages: Vec<LanguageCount>,
    pub available_metrics: Vec<String>,
    /// Only metrics with at least one observation appear
    pub metric_averages: BTreeMap<String, f64>,
    /// Mean number of missing core fields (name, algorithm, type, language) per row
    pub missing_field_rate: f64,
}

/// Legacy dashboard summary over the latest versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub total_models: usize,
    pub algorithms: BTreeMap<String, usize>,
    pub functions: BTreeMap<String, usize>,
    pub languages: BTreeMap<String, usize>,
    pub model_types: BTreeMap<String, usize>,
    pub target_levels: BTreeMap<String, usize>,
    pub tools: BTreeMap<String, usize>,
}

/// Compute the snapshot from the best available source.
///
/// The `master_latest` export is used only when `use_export` is set and the
/// export is newer than the canonical table. Otherwise the same frame is
/// built in memory from the canonical rows.
pub fn compute_insights(store: &RecordStore, use_export: bool) -> Result<InsightsSnapshot> {
    let exported = if use_export {
        master::read_latest_export(store.paths()).unwrap_or_else(|e| {
            tracing::warn!("Latest export unreadable, recomputing from canonical table: {e}");
            None
        })
    } else {
        None
    };
    let df = match exported {
        Some(df) => df,
        None => latest_frame_from_canonical(store)?,
    };
    insights_from_frame(&df)
}

/// Compute the snapshot and write it to `exports/insights.json`.
pub fn export_insights(store: &RecordStore, use_export: bool) -> Result<InsightsSnapshot> {
    let snapshot = compute_insights(store, use_export)?;
    let path = &store.paths().insights;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create exports directory")?;
    }
    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, json).context("Failed to write insights export")?;
    tracing::info!(path = %path.display(), "Exported insights");
    Ok(snapshot)
}

fn latest_frame_from_canonical(store: &RecordStore) -> Result<DataFrame> {
    let records = store.read_all()?;
    let rows: Vec<DerivedRow> = latest_of(&records)
        .iter()
        .map(|r| master::normalize_record(r, true))
        .collect();
    table::rows_to_frame(&rows)
}

/// Aggregate a derived frame that is already restricted to latest versions.
pub fn insights_from_frame(df: &DataFrame) -> Result<InsightsSnapshot> {
    let core = df
        .clone()
        .lazy()
        .with_columns([
            core_field(df, NAME_KEYS).alias(NAME),
            core_field(df, ALGORITHM_KEYS).alias(ALGORITHM),
            core_field(df, TYPE_KEYS).alias(MODEL_TYPE),
            core_field(df, LANGUAGE_KEYS).alias(LANGUAGE),
        ])
        .select([col(NAME), col(ALGORITHM), col(MODEL_TYPE), col(LANGUAGE)])
        .collect()?;

    let total_count = df.height();
    let missing: usize = core.get_columns().iter().map(Column::null_count).sum();
    let (available_metrics, metric_averages) = metric_stats(df)?;

    Ok(InsightsSnapshot {
        total_count,
        count_by_type: ranked_counts(&core, MODEL_TYPE)?.into_iter().collect(),
        most_used_algorithm: ranked_counts(&core, ALGORITHM)?
            .into_iter()
            .next()
            .map(|(algorithm, _)| algorithm),
        top_languages: ranked_counts(&core, LANGUAGE)?
            .into_iter()
            .take(TOP_LANGUAGES)
            .map(|(language, count)| LanguageCount { language, count })
            .collect(),
        available_metrics,
        metric_averages,
        missing_field_rate: if total_count == 0 {
            0.0
        } else {
            missing as f64 / total_count as f64
        },
    })
}

/// Legacy summary over the latest version of each identity.
pub fn compute_summary(store: &RecordStore) -> Result<ModelSummary> {
    let records = store.read_all()?;
    summary_from_records(&latest_of(&records))
}

pub fn summary_from_records(latest: &[ModelRecord]) -> Result<ModelSummary> {
    fn text(values: Vec<Option<&str>>) -> Vec<Option<&str>> {
        values
            .into_iter()
            .map(|v| v.filter(|s| !s.is_empty()))
            .collect()
    }

    let field = |f: fn(&ModelRecord) -> Option<&str>| text(latest.iter().map(f).collect());
    let payload = |key: &'static str| {
        text(
            latest
                .iter()
                .map(|r| r.raw_payload.get(key).and_then(Value::as_str))
                .collect(),
        )
    };

    let df = DataFrame::new(vec![
        Column::new("algorithm".into(), field(|r| r.algorithm.as_deref())),
        Column::new("language".into(), field(|r| r.programming_language.as_deref())),
        Column::new("model_type".into(), field(|r| r.model_type.as_deref())),
        Column::new("function".into(), payload("function")),
        Column::new("target_level".into(), payload("targetLevel")),
        Column::new("tool".into(), payload("tool")),
    ])?;
    let counts = |column: &str| -> Result<BTreeMap<String, usize>> {
        Ok(ranked_counts(&df, column)?.into_iter().collect())
    };

    Ok(ModelSummary {
        total_models: latest.len(),
        algorithms: counts("algorithm")?,
        functions: counts("function")?,
        languages: counts("language")?,
        model_types: counts("model_type")?,
        target_levels: counts("target_level")?,
        tools: counts("tool")?,
    })
}

/// First non-empty value among the `keys` columns present in `df`, as text.
fn core_field(df: &DataFrame, keys: &[&str]) -> Expr {
    keys.iter()
        .filter(|key| df.get_column_index(key).is_some())
        .rev()
        .fold(lit(NULL).cast(DataType::String), |fallback, key| {
            let value = non_empty_text(key);
            when(value.clone().is_not_null())
                .then(value)
                .otherwise(fallback)
        })
}

/// Column cast to text with `""` and `"[]"` read as missing.
fn non_empty_text(name: &str) -> Expr {
    let text = col(name).cast(DataType::String);
    when(text.clone().eq(lit("")).or(text.clone().eq(lit("[]"))))
        .then(lit(NULL).cast(DataType::String))
        .otherwise(text)
}

/// Non-null values of `column` with their counts, highest first. Equal counts
/// keep first-seen order.
fn ranked_counts(df: &DataFrame, column: &str) -> Result<Vec<(String, usize)>> {
    let counts = df
        .clone()
        .lazy()
        .select([col(column)])
        .filter(col(column).is_not_null())
        .group_by_stable([col(column)])
        .agg([len().alias(COUNT)])
        .sort(
            [COUNT],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let values = counts
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let tallies = counts
        .column(COUNT)?
        .as_materialized_series()
        .cast(&DataType::UInt64)?;

    Ok(values
        .str()?
        .into_iter()
        .zip(tallies.u64()?)
        .filter_map(|(value, n)| Some((value?.to_owned(), usize::try_from(n?).ok()?)))
        .collect())
}

/// Metric names with a numeric observation, and means of the known ones.
/// Unparsable cells cast to null and are skipped.
fn metric_stats(df: &DataFrame) -> Result<(Vec<String>, BTreeMap<String, f64>)> {
    let mut available = BTreeSet::new();
    let mut averages = BTreeMap::new();

    for column in df.get_columns() {
        let Some(metric) = column.name().as_str().strip_prefix(METRIC_PREFIX) else {
            continue;
        };
        if column.dtype().is_bool() {
            continue;
        }
        let cast = column.as_materialized_series().cast(&DataType::Float64)?;
        let values = cast.f64()?;
        if values.len() == values.null_count() {
            continue;
        }
        available.insert(metric.to_owned());
        if KNOWN_METRICS.contains(&metric)
            && let Some(mean) = values.mean().filter(|m| m.is_finite())
        {
            averages.insert(metric.to_owned(), mean);
        }
    }

    Ok((available.into_iter().collect(), averages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: Value) -> DerivedRow {
        serde_json::from_value(pairs).expect("fixture is an object")
    }

    fn insights(rows: &[DerivedRow]) -> Result<InsightsSnapshot> {
        insights_from_frame(&table::rows_to_frame(rows)?)
    }

    #[test]
    fn test_empty_rows_give_zeroed_snapshot() -> Result<()> {
        assert_eq!(insights(&[])?, InsightsSnapshot::default());
        Ok(())
    }

    #[test]
    fn test_most_used_algorithm() -> Result<()> {
        let rows = vec![
            row(json!({"algorithm": "XGBoost"})),
            row(json!({"algorithm": "LogisticRegression"})),
            row(json!({"algorithm": "XGBoost"})),
        ];
        let snap = insights(&rows)?;
        assert_eq!(snap.most_used_algorithm.as_deref(), Some("XGBoost"));
        Ok(())
    }

    #[test]
    fn test_algorithm_tie_keeps_first_seen() -> Result<()> {
        let rows = vec![
            row(json!({"algorithm": "SVM"})),
            row(json!({"algorithm": "KNN"})),
        ];
        assert_eq!(insights(&rows)?.most_used_algorithm.as_deref(), Some("SVM"));
        Ok(())
    }

    #[test]
    fn test_metric_average_over_present_values() -> Result<()> {
        let rows = vec![
            row(json!({"metric.accuracy": 0.8})),
            row(json!({"metric.accuracy": 0.6})),
            row(json!({"metric.f1": 0.5})),
        ];
        let snap = insights(&rows)?;
        let accuracy = snap.metric_averages.get("accuracy").copied().unwrap_or_default();
        assert!((accuracy - 0.7).abs() < 1e-9);
        assert!(!snap.metric_averages.contains_key("rmse"));
        assert_eq!(snap.available_metrics, vec!["accuracy".to_owned(), "f1".to_owned()]);
        Ok(())
    }

    #[test]
    fn test_non_numeric_metrics_are_skipped() -> Result<()> {
        let rows = vec![
            row(json!({"metric.accuracy": "n/a"})),
            row(json!({"metric.accuracy": "0.5"})),
            row(json!({"metric.custom_score": "bad"})),
        ];
        let snap = insights(&rows)?;
        assert_eq!(snap.metric_averages.get("accuracy"), Some(&0.5));
        assert_eq!(snap.available_metrics, vec!["accuracy".to_owned()]);
        Ok(())
    }

    #[test]
    fn test_top_languages_capped_and_ordered() -> Result<()> {
        let langs = ["python", "r", "python", "sas", "java", "scala", "go", "r", "python"];
        let rows: Vec<DerivedRow> = langs
            .iter()
            .map(|l| row(json!({"programming_language": l})))
            .collect();
        let snap = insights(&rows)?;
        assert_eq!(snap.top_languages.len(), TOP_LANGUAGES);
        assert_eq!(
            snap.top_languages[0],
            LanguageCount {
                language: "python".to_owned(),
                count: 3
            }
        );
        assert_eq!(snap.top_languages[1].language, "r");
        // Single-count languages keep first-seen order
        let tail: Vec<&str> = snap.top_languages[2..]
            .iter()
            .map(|l| l.language.as_str())
            .collect();
        assert_eq!(tail, vec!["sas", "java", "scala"]);
        Ok(())
    }

    #[test]
    fn test_type_and_language_fallbacks() -> Result<()> {
        let rows = vec![
            row(json!({"model_type": "classification"})),
            row(json!({"payload.modelType": "regression", "payload.scoreCodeType": "python"})),
            row(json!({"payload.model_type": "regression"})),
        ];
        let snap = insights(&rows)?;
        assert_eq!(snap.count_by_type.get("regression"), Some(&2));
        assert_eq!(snap.count_by_type.get("classification"), Some(&1));
        assert_eq!(snap.top_languages.len(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_field_rate_is_mean_count() -> Result<()> {
        let rows = vec![
            row(json!({"name": "a", "algorithm": "x", "model_type": "t", "programming_language": "py"})),
            row(json!({"name": "", "algorithm": null})),
        ];
        let snap = insights(&rows)?;
        // 0 missing + 4 missing over 2 rows
        assert!((snap.missing_field_rate - 2.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_frame_from_other_writer() -> Result<()> {
        // Narrower schema and dtypes than the rebuild writes
        let df = df! {
            "algorithm" => [Some("SVM"), Some("SVM"), None],
            "version" => [1i32, 2, 1],
            "metric.f1" => [Some(0.5f32), None, Some(0.25)],
            "metric.flag" => [true, false, true],
        }?;
        let snap = insights_from_frame(&df)?;
        assert_eq!(snap.total_count, 3);
        assert_eq!(snap.most_used_algorithm.as_deref(), Some("SVM"));
        assert_eq!(snap.metric_averages.get("f1"), Some(&0.375));
        assert_eq!(snap.available_metrics, vec!["f1".to_owned()]);
        // name, type and language are absent on every row, algorithm on one
        assert!((snap.missing_field_rate - 10.0 / 3.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_summary_counts() -> Result<()> {
        use crate::store::ModelSubmission;
        let make = |body: Value| -> Result<ModelRecord> {
            Ok(ModelRecord::first_version(
                uuid::Uuid::new_v4().to_string(),
                ModelSubmission::from_value(body)?,
            ))
        };
        let latest = vec![
            make(json!({"algorithm": "XGBoost", "function": "classification", "tool": "Python 3"}))?,
            make(json!({"algorithm": "XGBoost", "scoreCodeType": "python", "targetLevel": "binary"}))?,
        ];
        let summary = summary_from_records(&latest)?;
        assert_eq!(summary.total_models, 2);
        assert_eq!(summary.algorithms.get("XGBoost"), Some(&2));
        assert_eq!(summary.functions.get("classification"), Some(&1));
        assert_eq!(summary.languages.get("python"), Some(&1));
        assert_eq!(summary.target_levels.get("binary"), Some(&1));
        assert_eq!(summary.tools.get("Python 3"), Some(&1));
        assert!(summary.model_types.is_empty());
        Ok(())
    }
}
