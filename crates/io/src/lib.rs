// File I/O operations

pub mod csv;
pub mod drawing;
pub mod error;
pub mod json;

use std::path::Path;

use gridsift_engine::Record;

pub use error::IoError;

/// Records plus the column list to display, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

/// Load a record table, choosing the reader by extension
/// (`.json` is an array of objects, anything else is delimited text)
pub fn load_records(path: &Path) -> Result<RecordTable, IoError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => self::json::import(path),
        Some("tsv") | Some("tab") => self::csv::import_tsv(path),
        _ => self::csv::import(path),
    }
}
