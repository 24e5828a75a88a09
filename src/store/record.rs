//! Canonical record type and submission parsing.

use crate::error::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Candidate submission keys for the model type, newest producer first.
pub const MODEL_TYPE_ALIASES: &[&str] = &["modelType", "model_type"];
/// Candidate submission keys for the scoring language, newest producer first.
pub const LANGUAGE_ALIASES: &[&str] = &["scoreCodeType", "programming_language"];
/// Candidate submission keys for the creation timestamp, newest producer first.
pub const CREATED_AT_ALIASES: &[&str] = &["creationTimeStamp", "created_at"];

/// One version of one logical model. Rows sharing `id` form its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Unique per version row; target of `previous_version_id`
    pub row_id: Uuid,
    /// Stable identity shared by every version
    pub id: String,
    pub version: u32,
    pub name: Option<String>,
    pub algorithm: Option<String>,
    pub model_type: Option<String>,
    pub programming_language: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: Vec<String>,
    /// Full original submission, kept verbatim for flattening
    pub raw_payload: Map<String, Value>,
    pub source_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stored hint only; "latest" is always recomputed from `version`
    pub is_latest: bool,
    pub previous_version_id: Option<Uuid>,
}

impl ModelRecord {
    /// First version of a new identity.
    pub fn first_version(id: String, submission: ModelSubmission) -> Self {
        let now = Utc::now();
        let created_at = submission.created_at.unwrap_or(now);
        Self::from_submission(id, 1, created_at, now, None, submission)
    }

    /// Next version after `current`, which must be the identity's latest row.
    /// `created_at` is carried over from `first_created_at`.
    pub fn next_version(
        current: &Self,
        first_created_at: DateTime<Utc>,
        submission: ModelSubmission,
    ) -> Self {
        Self::from_submission(
            current.id.clone(),
            current.version + 1,
            first_created_at,
            Utc::now(),
            Some(current.row_id),
            submission,
        )
    }

    fn from_submission(
        id: String,
        version: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        previous_version_id: Option<Uuid>,
        submission: ModelSubmission,
    ) -> Self {
        let ModelSubmission {
            name,
            algorithm,
            model_type,
            programming_language,
            metrics,
            tags,
            source_filename,
            raw_payload,
            ..
        } = submission;

        Self {
            row_id: Uuid::new_v4(),
            id,
            version,
            name,
            algorithm,
            model_type,
            programming_language,
            metrics,
            tags,
            raw_payload,
            source_filename,
            created_at,
            updated_at,
            is_latest: true,
            previous_version_id,
        }
    }
}

/// A validated model submission.
///
/// Built from an arbitrary JSON object. Descriptive fields are pulled out
/// through their alias lists and the whole object is kept as `raw_payload`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSubmission {
    pub id: Option<String>,
    pub name: Option<String>,
    pub algorithm: Option<String>,
    pub model_type: Option<String>,
    pub programming_language: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub source_filename: Option<String>,
    pub raw_payload: Map<String, Value>,
}

impl ModelSubmission {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RegistryError::validation(format!("Invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(RegistryError::validation(format!(
                "Submission must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let id = optional_string(&map, "id")?.filter(|s| !s.trim().is_empty());
        let name = optional_string(&map, "name")?;
        let algorithm = optional_string(&map, "algorithm")?;
        let model_type = aliased_string(&map, MODEL_TYPE_ALIASES)?;
        let programming_language = aliased_string(&map, LANGUAGE_ALIASES)?;
        let metrics = parse_metrics(map.get("metrics"))?;
        let tags = parse_tags(map.get("tags"))?;
        let created_at = aliased_string(&map, CREATED_AT_ALIASES)?
            .map(|s| parse_timestamp(&s))
            .transpose()?;

        Ok(Self {
            id,
            name,
            algorithm,
            model_type,
            programming_language,
            metrics,
            tags,
            created_at,
            source_filename: None,
            raw_payload: map,
        })
    }

    pub fn with_source_filename(mut self, filename: impl Into<String>) -> Self {
        self.source_filename = Some(filename.into());
        self
    }
}

/// Field edits applied in place to every row of one identity.
///
/// Unset fields are left untouched. Not version-aware: this rewrites history
/// rows as well as the latest one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub name: Option<Option<String>>,
    pub algorithm: Option<Option<String>>,
    pub model_type: Option<Option<String>>,
    pub programming_language: Option<Option<String>>,
    pub metrics: Option<BTreeMap<String, f64>>,
    pub tags: Option<Vec<String>>,
    pub raw_payload: Option<Map<String, Value>>,
    pub source_filename: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_latest: Option<bool>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, record: &mut ModelRecord) {
        if let Some(v) = &self.name {
            record.name.clone_from(v);
        }
        if let Some(v) = &self.algorithm {
            record.algorithm.clone_from(v);
        }
        if let Some(v) = &self.model_type {
            record.model_type.clone_from(v);
        }
        if let Some(v) = &self.programming_language {
            record.programming_language.clone_from(v);
        }
        if let Some(v) = &self.metrics {
            record.metrics.clone_from(v);
        }
        if let Some(v) = &self.tags {
            record.tags.clone_from(v);
        }
        if let Some(v) = &self.raw_payload {
            record.raw_payload.clone_from(v);
        }
        if let Some(v) = &self.source_filename {
            record.source_filename.clone_from(v);
        }
        if let Some(v) = self.updated_at {
            record.updated_at = v;
        }
        if let Some(v) = self.is_latest {
            record.is_latest = v;
        }
    }
}

/// First non-empty string among `aliases`, or `None`.
///
/// Also used by the master rebuild to read legacy payload keys.
pub fn first_alias<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|key| map.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
}

fn aliased_string(map: &Map<String, Value>, aliases: &[&str]) -> Result<Option<String>> {
    for key in aliases {
        if let Some(value) = optional_string(map, key)?
            && !value.is_empty()
        {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(RegistryError::validation(format!(
            "Field '{key}' must be a string, got {}",
            json_kind(other)
        ))),
    }
}

fn parse_metrics(value: Option<&Value>) -> Result<BTreeMap<String, f64>> {
    let map = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(RegistryError::validation(format!(
                "Field 'metrics' must be an object, got {}",
                json_kind(other)
            )));
        }
    };

    let mut metrics = BTreeMap::new();
    for (name, raw) in map {
        let parsed = match raw {
            Value::Null => continue,
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(v) if v.is_finite() => {
                metrics.insert(name.clone(), v);
            }
            _ => {
                return Err(RegistryError::validation(format!(
                    "Metric '{name}' must be numeric, got {raw}"
                )));
            }
        }
    }
    Ok(metrics)
}

fn parse_tags(value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_owned).ok_or_else(|| {
                    RegistryError::validation(format!("Tags must be strings, got {item}"))
                })
            })
            .collect(),
        Some(other) => Err(RegistryError::validation(format!(
            "Field 'tags' must be an array, got {}",
            json_kind(other)
        ))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RegistryError::validation(format!("Invalid timestamp '{raw}': {e}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
