// Drawing files: a JSON set of documents and their objects
//
// {
//   "version": 1,
//   "documents": [
//     { "path": "current", "objects": [ { "id": 1, "handle": "20", "object": { "type": "Circle", ... } } ] }
//   ]
// }

use std::path::Path;

use serde::{Deserialize, Serialize};

use gridsift_engine::record::{DOCUMENT_PATH_FIELD, HANDLE_FIELD, OBJECT_ID_FIELD};
use gridsift_engine::target::{Document, MemoryDocuments};

use crate::error::IoError;
use crate::RecordTable;

/// Drawing file format version
/// Increment when schema changes in a way that old versions can't read
pub const DRAWING_FORMAT_VERSION: u32 = 1;

/// Columns shown first when present, in this order
const LEADING_COLUMNS: &[&str] = &[
    "Type",
    "Name",
    "Layer",
    "Color",
    "Linetype",
    "Rotation",
    "CenterX",
    "CenterY",
    "Radius",
    "Length",
    "Contents",
    "Height",
    "Scale",
    "Description",
];

/// Columns shown last
const TRAILING_COLUMNS: &[&str] = &[HANDLE_FIELD, DOCUMENT_PATH_FIELD];

fn is_listed(list: &[&str], column: &str) -> bool {
    list.iter().any(|&c| c == column)
}

#[derive(Debug, Serialize, Deserialize)]
struct DrawingFile {
    #[serde(default = "default_version")]
    version: u32,
    documents: Vec<Document>,
}

fn default_version() -> u32 {
    DRAWING_FORMAT_VERSION
}

pub(crate) fn from_value(json: serde_json::Value) -> Result<MemoryDocuments, IoError> {
    let file: DrawingFile = serde_json::from_value(json)?;
    if file.version > DRAWING_FORMAT_VERSION {
        return Err(IoError::Format(format!(
            "drawing format version {} is newer than supported ({})",
            file.version, DRAWING_FORMAT_VERSION
        )));
    }
    let mut documents = MemoryDocuments::new();
    for document in file.documents {
        documents.insert(document);
    }
    Ok(documents)
}

pub fn from_str(text: &str) -> Result<MemoryDocuments, IoError> {
    from_value(serde_json::from_str(text)?)
}

pub fn to_string(documents: &MemoryDocuments) -> Result<String, IoError> {
    let file = DrawingFile {
        version: DRAWING_FORMAT_VERSION,
        documents: documents.documents().cloned().collect(),
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

pub fn load(path: &Path) -> Result<MemoryDocuments, IoError> {
    let text = std::fs::read_to_string(path).map_err(|e| IoError::file(path, e))?;
    let documents = from_str(&text)?;
    log::debug!("loaded drawing {} ({} document(s))", path.display(), documents.documents().count());
    Ok(documents)
}

pub fn save(path: &Path, documents: &MemoryDocuments) -> Result<(), IoError> {
    let text = to_string(documents)?;
    std::fs::write(path, text).map_err(|e| IoError::file(path, e))?;
    log::info!("saved drawing {}", path.display());
    Ok(())
}

/// Records for every object plus the columns worth showing: well-known
/// columns first, other columns sorted by name, routing columns last.
/// `ObjectId` stays internal.
pub fn record_table(documents: &MemoryDocuments) -> RecordTable {
    let records = documents.records();
    let present = |name: &str| records.iter().any(|r| r.contains(name));

    let mut columns: Vec<String> = LEADING_COLUMNS
        .iter()
        .filter(|&&c| present(c))
        .map(|c| c.to_string())
        .collect();

    let mut others: Vec<String> = records
        .iter()
        .flat_map(|r| r.columns())
        .filter(|&c| !is_listed(LEADING_COLUMNS, c) && !is_listed(TRAILING_COLUMNS, c) && c != OBJECT_ID_FIELD)
        .map(str::to_string)
        .collect();
    others.sort();
    others.dedup();
    columns.extend(others);
    columns.extend(TRAILING_COLUMNS.iter().filter(|&&c| present(c)).map(|c| c.to_string()));

    RecordTable { columns, records }
}
