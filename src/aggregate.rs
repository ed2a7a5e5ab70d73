//! Row aggregation: turns uploaded rows plus a [`ChartConfig`] into
//! per-group chart series, with back-references to the source rows so
//! the frontend can drill into any bucket.
//!
//! Everything here is synchronous and pure over its inputs; the same
//! rows and config always produce the same series, in the same order.

use crate::model::{ChartConfig, UploadedRow};
use serde::Serialize;
use serde_json::Value;

/// Label used when no count-column value can be resolved for a row
pub const UNDEFINED_BUCKET: &str = "Não definido";

/// A named subset of rows sharing one count-column value
///
/// `count` always equals `rows.len()`; the rows are kept so a clicked
/// bucket can show its underlying data.
#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    /// Distinct stringified count-column value
    pub label: String,

    /// Number of member rows
    pub count: usize,

    /// Member rows, in input order
    pub rows: Vec<UploadedRow>,
}

impl Bucket {
    fn named(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: &UploadedRow) {
        self.count += 1;
        self.rows.push(row.clone());
    }
}

/// Chart series for one configured group
#[derive(Debug, Clone, Serialize)]
pub struct GroupSeries {
    /// Group display name
    pub group_name: String,

    /// Buckets in first-seen order; empty when no row matched the group
    pub buckets: Vec<Bucket>,
}

/// Two-cohort split produced by the team comparison pass
#[derive(Debug, Clone, Serialize)]
pub struct TeamSplit {
    pub team_a: Bucket,
    pub team_b: Bucket,
}

/// Stringify a cell value the way the chart labels expect
///
/// Strings pass through unquoted; numbers and booleans use their JSON
/// rendering.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve the count-column value for a row
///
/// Tries, in order: the positional key for the configured letter, the
/// configured label, the literal "Estado" and "status" headers, and
/// finally the [`UNDEFINED_BUCKET`] fallback. A stored JSON null counts
/// as absent and falls through to the next key.
pub fn resolve_field(row: &UploadedRow, column: &str, label: &str) -> String {
    let keys = [
        format!("col_{}", column),
        label.to_string(),
        "Estado".to_string(),
        "status".to_string(),
    ];
    for key in &keys {
        if let Some(value) = row.columns.get(key) {
            if !value.is_null() {
                return value_to_string(value);
            }
        }
    }
    UNDEFINED_BUCKET.to_string()
}

/// Aggregate rows into one chart series per configured group
///
/// For each group, in config order: rows whose sheet name contains any of
/// the group's patterns (case-insensitive substring match) are bucketed
/// by their resolved count-column value. Buckets appear in the order
/// their label is first seen while scanning the rows in input order.
/// Every group yields an entry, even with zero matching rows.
///
/// Rows may be counted in more than one group when patterns overlap, but
/// never twice within one group.
pub fn aggregate(rows: &[UploadedRow], config: &ChartConfig) -> Vec<GroupSeries> {
    config
        .groups
        .iter()
        .map(|group| {
            let patterns: Vec<String> = group.sheets.iter().map(|s| s.to_lowercase()).collect();

            let mut buckets: Vec<Bucket> = Vec::new();
            for row in rows {
                let sheet = row.sheet_name.to_lowercase();
                if !patterns.iter().any(|pattern| sheet.contains(pattern)) {
                    continue;
                }

                let label = resolve_field(row, &config.count_column, &config.count_column_label);
                match buckets.iter_mut().find(|bucket| bucket.label == label) {
                    Some(bucket) => bucket.push(row),
                    None => {
                        let mut bucket = Bucket::named(label);
                        bucket.push(row);
                        buckets.push(bucket);
                    }
                }
            }

            GroupSeries {
                group_name: group.name.clone(),
                buckets,
            }
        })
        .collect()
}

/// Split rows into the two configured team cohorts
///
/// Returns `None` when the config has no team comparison. Each row's
/// resolved count-column value is lowercased and tested against team A's
/// keywords first, then team B's; rows matching neither are dropped.
/// This is a lossy, opt-in view: dropped rows are not an error. Row
/// order within each cohort mirrors the input order.
pub fn compare_teams(rows: &[UploadedRow], config: &ChartConfig) -> Option<TeamSplit> {
    let comparison = config.team_comparison.as_ref()?;

    let mut team_a = Bucket::named("Equipe A");
    let mut team_b = Bucket::named("Equipe B");

    for row in rows {
        let value = resolve_field(row, &config.count_column, &config.count_column_label)
            .to_lowercase();

        if comparison.team_a_keywords.iter().any(|kw| value.contains(kw)) {
            team_a.push(row);
        } else if comparison.team_b_keywords.iter().any(|kw| value.contains(kw)) {
            team_b.push(row);
        }
    }

    Some(TeamSplit { team_a, team_b })
}
