use model_registry::config::RegistryConfig;
use model_registry::error::{RegistryError, Result};
use model_registry::flatten::flatten;
use model_registry::service::ModelService;
use model_registry::store::ModelSubmission;
use serde_json::{Value, json};
use std::thread;
use tempfile::TempDir;

fn open(temp: &TempDir) -> Result<ModelService> {
    ModelService::open(RegistryConfig::with_data_dir(temp.path()))
}

fn submission(body: Value) -> Result<ModelSubmission> {
    ModelSubmission::from_value(body)
}

#[test]
fn test_create_then_list() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let record = svc.create(submission(json!({"name": "churn", "algorithm": "XGBoost"}))?)?;
    assert!(!record.id.is_empty());
    assert_eq!(record.version, 1);

    let all = svc.list(false)?;
    assert!(all.iter().any(|r| r.id == record.id && r.version == 1));
    Ok(())
}

#[test]
fn test_updates_increment_version_by_one() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let created = svc.create(submission(json!({"name": "v1"}))?)?;
    for expected in 2..=4 {
        let updated = svc.update(&created.id, submission(json!({"name": format!("v{expected}")}))?)?;
        assert_eq!(updated.version, expected);
    }

    let latest = svc.read(&created.id, None)?;
    assert_eq!(latest.version, 4);
    assert_eq!(latest.name.as_deref(), Some("v4"));

    assert_eq!(svc.list(false)?.len(), 4);
    let latest_only = svc.list(true)?;
    assert_eq!(latest_only.len(), 1);
    assert_eq!(latest_only[0].version, 4);

    let flags: Vec<bool> = svc.history(&created.id)?.iter().map(|r| r.is_latest).collect();
    assert_eq!(flags, vec![false, false, false, true]);
    Ok(())
}

#[test]
fn test_unknown_id_is_not_found() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    assert!(svc.read("does-not-exist", None).unwrap_err().is_not_found());
    assert!(svc.read("does-not-exist", Some(1)).unwrap_err().is_not_found());
    assert!(
        svc.update("does-not-exist", ModelSubmission::default())
            .unwrap_err()
            .is_not_found()
    );
    Ok(())
}

#[test]
fn test_invalid_submission_writes_nothing() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let err = ModelSubmission::from_json_str(r#"{"metrics": {"accuracy": "high"}}"#).unwrap_err();
    assert!(err.is_validation());

    let path = temp.path().join("broken.json");
    std::fs::write(&path, "{not json")?;
    assert!(svc.create_from_file(&path).unwrap_err().is_validation());
    assert!(svc.list(false)?.is_empty());
    Ok(())
}

#[test]
fn test_rebuild_failure_does_not_fail_write() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    // A plain file where the exports directory should be
    std::fs::write(temp.path().join("exports"), "not a directory")?;

    let record = svc.create(submission(json!({"name": "survives"}))?)?;
    assert_eq!(svc.read(&record.id, None)?.name.as_deref(), Some("survives"));
    assert!(svc.rebuild().is_err());
    Ok(())
}

#[test]
fn test_rebuild_and_insights() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let a = svc.create(submission(json!({
        "name": "fraud",
        "algorithm": "XGBoost",
        "modelType": "classification",
        "scoreCodeType": "python",
        "metrics": {"accuracy": 0.5},
    }))?)?;
    svc.update(&a.id, submission(json!({
        "name": "fraud",
        "algorithm": "XGBoost",
        "modelType": "classification",
        "scoreCodeType": "python",
        "metrics": {"accuracy": 0.8},
    }))?)?;
    svc.create(submission(json!({
        "name": "churn",
        "algorithm": "XGBoost",
        "model_type": "classification",
        "programming_language": "R",
        "metrics": {"accuracy": 0.6, "f1": 0.4},
    }))?)?;
    svc.create(submission(json!({"algorithm": "LinearRegression"}))?)?;

    let report = svc.rebuild()?;
    assert_eq!(report.all_rows, 4);
    assert_eq!(report.latest_rows, 3);

    let snap = svc.insights()?;
    assert_eq!(snap.total_count, 3);
    assert_eq!(snap.most_used_algorithm.as_deref(), Some("XGBoost"));
    assert_eq!(snap.count_by_type.get("classification"), Some(&2));
    let accuracy = snap.metric_averages.get("accuracy").copied().unwrap_or_default();
    assert!((accuracy - 0.7).abs() < 1e-9, "superseded 0.5 must not count");
    assert_eq!(snap.available_metrics, vec!["accuracy".to_owned(), "f1".to_owned()]);
    // Last model lacks name, type and language
    assert!((snap.missing_field_rate - 1.0).abs() < 1e-9);

    let exported = svc.export_insights()?;
    let on_disk: Value =
        serde_json::from_str(&std::fs::read_to_string(&svc.store().paths().insights)?)?;
    assert_eq!(on_disk["total_count"], json!(exported.total_count));
    Ok(())
}

#[test]
fn test_insights_without_exports_reads_canonical() -> Result<()> {
    let temp = TempDir::new()?;
    let config = RegistryConfig {
        rebuild_on_write: false,
        ..RegistryConfig::with_data_dir(temp.path())
    };
    let svc = ModelService::open(config)?;
    assert_eq!(svc.insights()?.total_count, 0);

    let m = svc.create(submission(json!({"algorithm": "SVM", "metrics": {"rmse": 2.0}}))?)?;
    svc.update(&m.id, submission(json!({"algorithm": "SVM", "metrics": {"rmse": 4.0}}))?)?;

    assert!(!svc.store().paths().master_latest.parquet.exists());
    let snap = svc.insights()?;
    assert_eq!(snap.total_count, 1);
    assert_eq!(snap.metric_averages.get("rmse"), Some(&4.0));
    Ok(())
}

#[test]
fn test_summary_counts_latest_versions() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let m = svc.create(submission(json!({"algorithm": "SVM", "tool": "SAS"}))?)?;
    svc.update(&m.id, submission(json!({"algorithm": "KNN", "tool": "Python 3"}))?)?;
    svc.create(submission(json!({"algorithm": "KNN", "function": "prediction"}))?)?;

    let summary = svc.summary()?;
    assert_eq!(summary.total_models, 2);
    assert_eq!(summary.algorithms.get("KNN"), Some(&2));
    assert!(!summary.algorithms.contains_key("SVM"));
    assert_eq!(summary.tools.get("Python 3"), Some(&1));
    assert_eq!(summary.functions.get("prediction"), Some(&1));
    Ok(())
}

#[test]
fn test_ingest_dir_skips_invalid_files() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let inbox = temp.path().join("inbox");
    std::fs::create_dir(&inbox)?;
    std::fs::write(inbox.join("a.json"), r#"{"id": "a", "name": "first"}"#)?;
    std::fs::write(inbox.join("b.json"), r#"{"id": "b", "metrics": {"f1": "bad"}}"#)?;
    std::fs::write(inbox.join("c.json"), r#"{"id": "c", "name": "third"}"#)?;
    std::fs::write(inbox.join("readme.txt"), "ignored")?;

    let report = svc.ingest_dir(&inbox)?;
    assert_eq!(report.created, vec!["a".to_owned(), "c".to_owned()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].file, "b.json");

    assert_eq!(svc.read("c", None)?.source_filename.as_deref(), Some("c.json"));
    assert_eq!(svc.rebuild()?.latest_rows, 2);
    Ok(())
}

#[test]
fn test_ingest_unlistable_dir_is_storage_error() -> Result<()> {
    let temp = TempDir::new()?;
    let svc = open(&temp)?;

    let err = svc.ingest_dir(&temp.path().join("missing")).unwrap_err();
    assert!(
        matches!(err, RegistryError::Storage(ref msg) if msg.starts_with("Failed to read directory")),
        "unexpected error: {err}"
    );
    assert!(svc.list(false)?.is_empty());
    Ok(())
}

#[test]
fn test_flatten_nested_payload() {
    let nested = json!({"a": {"b": {"c": 5}}});
    let Value::Object(map) = nested else {
        unreachable!("fixture is an object")
    };
    let flat = flatten(&map);
    assert_eq!(flat.len(), 1);
    assert_eq!(flat.get("a.b.c"), Some(&json!(5)));
}

/// Writers are not serialized: each create rewrites the table it read, so
/// concurrent creates can drop each other's rows. Reports how many were lost.
#[test]
fn test_concurrent_creates_known_race() -> Result<()> {
    const WRITERS: usize = 4;
    let temp = TempDir::new()?;
    let config = RegistryConfig {
        rebuild_on_write: false,
        ..RegistryConfig::with_data_dir(temp.path())
    };
    let svc = ModelService::open(config)?;

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let svc = svc.clone();
            thread::spawn(move || svc.create(ModelSubmission::from_value(json!({"name": format!("m{i}")}))?))
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.join().expect("writer thread panicked").is_ok() {
            succeeded += 1;
        }
    }
    // Snapshots are swapped whole, so every create completes and reads never fail
    assert_eq!(succeeded, WRITERS);

    let rows = svc.list(false)?;
    // The last rewrite always carries its own row; earlier rows may be dropped
    assert!(
        (1..=succeeded).contains(&rows.len()),
        "{} rows after {succeeded} creates",
        rows.len()
    );
    for row in &rows {
        let name = row.name.as_deref().unwrap_or_default();
        assert!((0..WRITERS).any(|i| name == format!("m{i}")), "unexpected row {name}");
    }
    let lost = succeeded - rows.len();
    if lost > 0 {
        eprintln!("{lost} of {succeeded} concurrent creates were overwritten");
    }
    Ok(())
}
