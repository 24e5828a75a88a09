//! Conversion of derived rows into columnar frames.
//!
//! Derived tables have a variable schema: whatever payload shapes were
//! submitted become columns. Each column's type is inferred from its non-null
//! values (integers, floats, booleans, otherwise text).

use super::{BASE_COLUMNS, DerivedRow};
use crate::error::Result;
use polars::prelude::*;
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Column order: base columns first, then every other key sorted by name.
pub fn column_names(rows: &[DerivedRow]) -> Vec<String> {
    let extra: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .filter(|key| !BASE_COLUMNS.contains(key))
        .collect();

    BASE_COLUMNS
        .iter()
        .copied()
        .chain(extra)
        .map(str::to_owned)
        .collect()
}

pub fn rows_to_frame(rows: &[DerivedRow]) -> Result<DataFrame> {
    let columns: Vec<Column> = column_names(rows)
        .iter()
        .map(|name| {
            let values: Vec<&Value> = rows
                .iter()
                .map(|row| row.get(name).unwrap_or(&Value::Null))
                .collect();
            build_column(name, &values)
        })
        .collect();

    Ok(DataFrame::new(columns)?)
}

fn infer_kind(values: &[&Value]) -> ColumnKind {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    if present.is_empty() {
        ColumnKind::Text
    } else if present.iter().all(|v| v.is_i64()) {
        ColumnKind::Int
    } else if present.iter().all(|v| v.is_number()) {
        ColumnKind::Float
    } else if present.iter().all(|v| v.is_boolean()) {
        ColumnKind::Bool
    } else {
        ColumnKind::Text
    }
}

fn build_column(name: &str, values: &[&Value]) -> Column {
    match infer_kind(values) {
        ColumnKind::Int => {
            let data: Vec<Option<i64>> = values.iter().map(|v| v.as_i64()).collect();
            Column::new(name.into(), data)
        }
        ColumnKind::Float => {
            let data: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
            Column::new(name.into(), data)
        }
        ColumnKind::Bool => {
            let data: Vec<Option<bool>> = values.iter().map(|v| v.as_bool()).collect();
            Column::new(name.into(), data)
        }
        ColumnKind::Text => {
            let data: Vec<Option<String>> = values.iter().map(|v| text_cell(v)).collect();
            Column::new(name.into(), data)
        }
    }
}

fn text_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
