//! Drill-down projection: decides which row fields to show when the user
//! clicks into an aggregated bucket.

use crate::model::{ChartConfig, ColumnSpec, UploadedRow, SHEET_FIELD};

/// Maximum number of columns derived when the prompt specifies none
const DEFAULT_COLUMN_LIMIT: usize = 6;

/// Select the drill-down columns for a bucket's row table
///
/// A non-empty `config.drilldown_columns` is returned verbatim.
/// Otherwise up to 6 columns are derived from the sample row, using each
/// column key as both key and label, in the row's key order.
pub fn project_columns(config: &ChartConfig, sample_row: &UploadedRow) -> Vec<ColumnSpec> {
    if !config.drilldown_columns.is_empty() {
        return config.drilldown_columns.clone();
    }

    sample_row
        .columns
        .keys()
        .take(DEFAULT_COLUMN_LIMIT)
        .map(|key| ColumnSpec {
            key: key.clone(),
            label: key.clone(),
        })
        .collect()
}

/// Render one projected field of a row as display text
///
/// The synthetic [`SHEET_FIELD`] key reads the sheet name rather than a
/// stored column. Missing columns and stored nulls render as an empty
/// string.
pub fn field_display(row: &UploadedRow, key: &str) -> String {
    if key == SHEET_FIELD {
        return row.sheet_name.clone();
    }
    match row.columns.get(key) {
        Some(value) if value.is_string() => value.as_str().unwrap_or_default().to_string(),
        Some(value) if !value.is_null() => value.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_row(cells: &[(&str, serde_json::Value)]) -> UploadedRow {
        let mut columns = BTreeMap::new();
        for (key, value) in cells {
            columns.insert(key.to_string(), value.clone());
        }
        UploadedRow {
            id: "r1".to_string(),
            item_id: "item".to_string(),
            sheet_name: "Suporte Jan".to_string(),
            row_index: 1,
            columns,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn configured_columns_returned_verbatim() {
        let mut config = ChartConfig::default_for(&[]);
        config.drilldown_columns = vec![ColumnSpec {
            key: "col_C".to_string(),
            label: "Responsável".to_string(),
        }];
        let row = sample_row(&[("col_A", json!("x"))]);
        assert_eq!(project_columns(&config, &row), config.drilldown_columns);
    }

    #[test]
    fn default_projection_caps_at_six_columns() {
        let config = ChartConfig::default_for(&[]);
        let row = sample_row(&[
            ("col_A", json!(1)),
            ("col_B", json!(2)),
            ("col_C", json!(3)),
            ("col_D", json!(4)),
            ("col_E", json!(5)),
            ("col_F", json!(6)),
            ("col_G", json!(7)),
            ("col_H", json!(8)),
        ]);
        let columns = project_columns(&config, &row);
        assert_eq!(columns.len(), 6);
        // Key doubles as label in the derived projection.
        assert!(columns.iter().all(|c| c.key == c.label));
    }

    #[test]
    fn sheet_field_reads_the_sheet_name() {
        let row = sample_row(&[("col_A", json!("valor"))]);
        assert_eq!(field_display(&row, SHEET_FIELD), "Suporte Jan");
        assert_eq!(field_display(&row, "col_A"), "valor");
        assert_eq!(field_display(&row, "col_Z"), "");
    }

    #[test]
    fn numbers_render_without_quotes() {
        let row = sample_row(&[("col_A", json!(42)), ("col_B", json!(null))]);
        assert_eq!(field_display(&row, "col_A"), "42");
        assert_eq!(field_display(&row, "col_B"), "");
    }
}
