// JSON record import

use std::path::Path;

use serde_json::Value as Json;

use gridsift_engine::{Record, Value};

use crate::error::IoError;
use crate::RecordTable;

pub fn import(path: &Path) -> Result<RecordTable, IoError> {
    let text = std::fs::read_to_string(path).map_err(|e| IoError::file(path, e))?;
    import_from_str(&text)
}

/// An array of flat objects, or a drawing file (`{"documents": [...]}`)
pub fn import_from_str(text: &str) -> Result<RecordTable, IoError> {
    let json: Json = serde_json::from_str(text)?;
    if json.is_object() && json.get("documents").is_some() {
        let documents = crate::drawing::from_value(json)?;
        return Ok(crate::drawing::record_table(&documents));
    }
    match json {
        Json::Array(items) => records_from_array(items),
        _ => Err(IoError::Format(
            "expected an array of records or a drawing file".to_string(),
        )),
    }
}

fn records_from_array(items: Vec<Json>) -> Result<RecordTable, IoError> {
    let mut table = RecordTable::default();
    for (i, item) in items.into_iter().enumerate() {
        let Json::Object(map) = item else {
            return Err(IoError::Format(format!("record {} is not an object", i)));
        };
        let mut record = Record::new();
        for (key, value) in map {
            let Some(value) = cell_value(value) else { continue };
            if !table.columns.contains(&key) {
                table.columns.push(key.clone());
            }
            record.set(key, value);
        }
        table.records.push(record);
    }
    log::debug!("imported {} record(s), {} column(s)", table.records.len(), table.columns.len());
    Ok(table)
}

/// Nulls are dropped; nested values are kept as their JSON text
fn cell_value(json: Json) -> Option<Value> {
    match json {
        Json::Null => None,
        Json::Bool(b) => Some(Value::Bool(b)),
        Json::Number(n) => n.as_f64().map(Value::Number),
        Json::String(s) => Some(Value::Text(s)),
        other => Some(Value::Text(other.to_string())),
    }
}
