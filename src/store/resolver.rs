//! Latest-version resolution.
//!
//! "Latest" is recomputed from version numbers on every read. The stored
//! `is_latest` flag is never consulted.

use super::record::ModelRecord;
use std::collections::HashMap;

/// Pick the representative (latest) row for every identity in `records`.
///
/// Highest `version` wins. Versions are unique per identity by construction;
/// if two rows do tie, the more recent `updated_at` wins, and after that the
/// row appearing later in the table. Output follows the order in which each
/// identity first appears.
pub fn latest_of(records: &[ModelRecord]) -> Vec<ModelRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut best: HashMap<&str, &ModelRecord> = HashMap::new();

    for record in records {
        let replace = match best.get(record.id.as_str()) {
            Some(current) => supersedes(record, current),
            None => {
                order.push(&record.id);
                true
            }
        };
        if replace {
            best.insert(&record.id, record);
        }
    }

    order
        .into_iter()
        .filter_map(|id| best.get(id).map(|r| (*r).clone()))
        .collect()
}

/// Latest row of a single identity, if any row has that identity.
pub fn latest_for<'a>(records: &'a [ModelRecord], id: &str) -> Option<&'a ModelRecord> {
    records
        .iter()
        .filter(|r| r.id == id)
        .fold(None, |best, r| match best {
            Some(b) if !supersedes(r, b) => Some(b),
            _ => Some(r),
        })
}

/// Rows of one identity sorted by ascending version.
pub fn history_of<'a>(records: &'a [ModelRecord], id: &str) -> Vec<&'a ModelRecord> {
    let mut rows: Vec<&ModelRecord> = records.iter().filter(|r| r.id == id).collect();
    rows.sort_by_key(|r| r.version);
    rows
}

fn supersedes(candidate: &ModelRecord, current: &ModelRecord) -> bool {
    (candidate.version, candidate.updated_at) >= (current.version, current.updated_at)
}
