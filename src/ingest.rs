//! Spreadsheet ingestion: decodes an uploaded XLSX workbook into
//! [`UploadedRow`] records and runs the delete-then-insert upload
//! pipeline against a [`RowStore`].
//!
//! The pipeline replaces all prior rows of a dashboard item. It is not
//! transactional: the delete completes before the first insert, inserts
//! happen in sequential batches, and a failing batch abandons the rest
//! without rolling anything back. A failure can therefore leave the item
//! with zero or partially-loaded rows; callers surface the error and the
//! next successful upload repairs the data.

use crate::model::UploadedRow;
use calamine::{Data, Reader, Xlsx};
use chrono::Utc;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use uuid::Uuid;

/// Rows inserted per storage call during an upload
pub const BATCH_SIZE: usize = 100;

/// Decoded content of one worksheet: the sheet name plus one column map
/// per non-empty data row
#[derive(Debug, Clone)]
pub struct SheetRows {
    pub sheet_name: String,
    pub rows: Vec<BTreeMap<String, Value>>,
}

/// Steps of the upload pipeline
///
/// `Error` is terminal and reachable from any step; `Done` is only
/// reached after every batch insert succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Idle,
    Parsing,
    DeletingPrevious,
    InsertingBatches,
    Done,
    Error,
}

/// Failure of the upload pipeline, recording the step it died in
#[derive(Debug)]
pub struct UploadError {
    /// Step that failed
    pub stage: UploadStage,

    /// Underlying storage or decoding error
    pub message: String,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload failed during {:?}: {}", self.stage, self.message)
    }
}

impl std::error::Error for UploadError {}

/// Counts reported after a finished upload
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UploadStats {
    /// Worksheets that contained data
    pub sheets: usize,

    /// Total rows inserted
    pub rows: usize,
}

/// Storage seam used by the upload pipeline
///
/// Implemented by [`crate::store::Database`]; tests substitute a failing
/// mock to exercise the partial-failure behavior.
pub trait RowStore {
    /// Remove every stored row belonging to the item
    fn delete_rows_for_item(&self, item_id: &str) -> Result<(), String>;

    /// Insert one batch of rows
    fn insert_rows(&self, rows: &[UploadedRow]) -> Result<(), String>;
}

/// Convert a 1-based column number to a spreadsheet-style letter
/// (A, B, ..., Z, AA, AB, ...)
fn column_letter(col: usize) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}

/// Convert a decoded cell into its stored JSON value
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Int(i) => Value::Number((*i).into()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Number::from_f64(dt.as_f64())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) => Value::Null,
    }
}

/// Build the column maps for one worksheet
///
/// The first row is the header row. Every cell of a data row is stored
/// under its positional key (`col_A`, `col_B`, ...) and additionally
/// under the trimmed header text when the header cell is non-empty, so a
/// cell is reachable both positionally and by name. Rows whose cells are
/// all empty are skipped; a sheet without at least one header row and
/// one data row yields no rows at all.
fn sheet_rows(sheet_name: &str, rows: &[&[Data]]) -> Option<SheetRows> {
    if rows.len() < 2 {
        return None;
    }

    let headers: Vec<Option<String>> = rows[0]
        .iter()
        .map(|cell| match cell {
            Data::Empty => None,
            other => {
                let text = other.to_string().trim().to_string();
                if text.is_empty() { None } else { Some(text) }
            }
        })
        .collect();

    let mut parsed = Vec::new();
    for row in &rows[1..] {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }

        let mut columns = BTreeMap::new();
        for (index, cell) in row.iter().enumerate() {
            let value = cell_value(cell);
            columns.insert(format!("col_{}", column_letter(index + 1)), value.clone());
            if let Some(Some(header)) = headers.get(index) {
                columns.insert(header.clone(), value);
            }
        }
        parsed.push(columns);
    }

    if parsed.is_empty() {
        return None;
    }
    Some(SheetRows {
        sheet_name: sheet_name.to_string(),
        rows: parsed,
    })
}

/// Decode an XLSX workbook into per-sheet row maps
///
/// # Errors
/// * Returns an error if the bytes are not a readable XLSX workbook
pub fn parse_workbook(bytes: &[u8]) -> Result<Vec<SheetRows>, String> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| format!("Failed to open workbook: {}", e))?;

    let mut sheets = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| format!("Failed to read sheet {}: {}", sheet_name, e))?;

        let rows: Vec<&[Data]> = range.rows().collect();
        if let Some(sheet) = sheet_rows(&sheet_name, &rows) {
            sheets.push(sheet);
        }
    }

    Ok(sheets)
}

/// Materialize decoded sheet rows into [`UploadedRow`] records for an
/// item, with fresh ids and 1-based per-sheet row indices
pub fn build_rows(item_id: &str, sheets: &[SheetRows]) -> Vec<UploadedRow> {
    let now = Utc::now();
    let mut rows = Vec::new();
    for sheet in sheets {
        for (index, columns) in sheet.rows.iter().enumerate() {
            rows.push(UploadedRow {
                id: Uuid::new_v4().to_string(),
                item_id: item_id.to_string(),
                sheet_name: sheet.sheet_name.clone(),
                row_index: (index + 1) as i64,
                columns: columns.clone(),
                created_at: now,
            });
        }
    }
    rows
}

/// Replace an item's stored rows with freshly decoded sheet data
///
/// Deletes all prior rows for the item, then inserts the new rows in
/// batches of `batch_size`, strictly sequentially. A batch failure
/// abandons the remaining batches; rows inserted before the failure stay
/// in place and the prior delete is not compensated.
///
/// # Errors
/// * [`UploadStage::DeletingPrevious`] - the delete call failed; old
///   rows may or may not remain
/// * [`UploadStage::InsertingBatches`] - a batch insert failed; the item
///   holds only the batches inserted so far
pub fn upload_rows(
    store: &dyn RowStore,
    item_id: &str,
    sheets: &[SheetRows],
    batch_size: usize,
) -> Result<UploadStats, UploadError> {
    let rows = build_rows(item_id, sheets);

    store
        .delete_rows_for_item(item_id)
        .map_err(|message| UploadError {
            stage: UploadStage::DeletingPrevious,
            message,
        })?;

    for batch in rows.chunks(batch_size.max(1)) {
        store.insert_rows(batch).map_err(|message| UploadError {
            stage: UploadStage::InsertingBatches,
            message,
        })?;
    }

    Ok(UploadStats {
        sheets: sheets.len(),
        rows: rows.len(),
    })
}

/// Full upload pipeline: decode the workbook, then replace the item's
/// rows
pub fn upload_workbook(
    store: &dyn RowStore,
    item_id: &str,
    bytes: &[u8],
) -> Result<UploadStats, UploadError> {
    let sheets = parse_workbook(bytes).map_err(|message| UploadError {
        stage: UploadStage::Parsing,
        message,
    })?;
    upload_rows(store, item_id, &sheets, BATCH_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// In-memory store that can be told to fail on the nth insert call
    struct MemoryStore {
        rows: RefCell<Vec<UploadedRow>>,
        fail_on_insert: Option<usize>,
        inserts_seen: RefCell<usize>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                rows: RefCell::new(Vec::new()),
                fail_on_insert: None,
                inserts_seen: RefCell::new(0),
            }
        }

        fn failing_on(batch: usize) -> Self {
            Self {
                fail_on_insert: Some(batch),
                ..Self::new()
            }
        }
    }

    impl RowStore for MemoryStore {
        fn delete_rows_for_item(&self, item_id: &str) -> Result<(), String> {
            self.rows.borrow_mut().retain(|row| row.item_id != item_id);
            Ok(())
        }

        fn insert_rows(&self, rows: &[UploadedRow]) -> Result<(), String> {
            let mut seen = self.inserts_seen.borrow_mut();
            *seen += 1;
            if self.fail_on_insert == Some(*seen) {
                return Err("simulated storage failure".to_string());
            }
            self.rows.borrow_mut().extend_from_slice(rows);
            Ok(())
        }
    }

    fn sheet(name: &str, row_count: usize) -> SheetRows {
        let rows = (0..row_count)
            .map(|i| {
                let mut columns = BTreeMap::new();
                columns.insert("col_A".to_string(), json!(format!("valor {}", i)));
                columns
            })
            .collect();
        SheetRows {
            sheet_name: name.to_string(),
            rows,
        }
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
    }

    #[test]
    fn dual_keys_positional_and_header() {
        let header = vec![
            Data::String("Nome".to_string()),
            Data::Empty,
            Data::String(" Estado ".to_string()),
        ];
        let data = vec![
            Data::String("Chamado 1".to_string()),
            Data::Int(7),
            Data::String("Aberto".to_string()),
        ];
        let rows: Vec<&[Data]> = vec![&header, &data];

        let sheet = sheet_rows("Suporte", &rows).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        let columns = &sheet.rows[0];

        // Both addressing forms reach the same cell.
        assert_eq!(columns["col_A"], json!("Chamado 1"));
        assert_eq!(columns["Nome"], json!("Chamado 1"));
        assert_eq!(columns["col_C"], json!("Aberto"));
        assert_eq!(columns["Estado"], json!("Aberto"));
        // Column B has no header, so only the positional key exists.
        assert_eq!(columns["col_B"], json!(7));
        assert!(!columns.contains_key(""));
    }

    #[test]
    fn empty_rows_and_header_only_sheets_are_skipped() {
        let header = vec![Data::String("Nome".to_string())];
        let empty = vec![Data::Empty];
        let rows: Vec<&[Data]> = vec![&header, &empty];
        assert!(sheet_rows("Vazia", &rows).is_none());

        let only_header: Vec<&[Data]> = vec![&header];
        assert!(sheet_rows("SóCabeçalho", &only_header).is_none());
    }

    #[test]
    fn upload_replaces_previous_rows() {
        let store = MemoryStore::new();
        let old = build_rows("item-1", &[sheet("Antiga", 3)]);
        store.insert_rows(&old).unwrap();

        let stats = upload_rows(&store, "item-1", &[sheet("Nova", 2)], BATCH_SIZE).unwrap();
        assert_eq!(stats.sheets, 1);
        assert_eq!(stats.rows, 2);

        let rows = store.rows.borrow();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.sheet_name == "Nova"));
    }

    #[test]
    fn row_indices_are_one_based_per_sheet() {
        let rows = build_rows("item-1", &[sheet("A", 2), sheet("B", 1)]);
        let indices: Vec<(String, i64)> = rows
            .iter()
            .map(|row| (row.sheet_name.clone(), row.row_index))
            .collect();
        assert_eq!(
            indices,
            vec![
                ("A".to_string(), 1),
                ("A".to_string(), 2),
                ("B".to_string(), 1)
            ]
        );
    }

    #[test]
    fn failed_batch_leaves_earlier_batches_in_place() {
        // Documented behavior, not a bug to fix here: there is no
        // rollback, so batches inserted before the failure survive.
        let store = MemoryStore::failing_on(2);
        let result = upload_rows(&store, "item-1", &[sheet("Dados", 5)], 2);

        let err = result.unwrap_err();
        assert_eq!(err.stage, UploadStage::InsertingBatches);

        let rows = store.rows.borrow();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.item_id == "item-1"));
    }

    #[test]
    fn invalid_workbook_fails_in_parsing_stage() {
        let store = MemoryStore::new();
        let err = upload_workbook(&store, "item-1", b"not an xlsx file").unwrap_err();
        assert_eq!(err.stage, UploadStage::Parsing);
        assert!(store.rows.borrow().is_empty());
    }
}
