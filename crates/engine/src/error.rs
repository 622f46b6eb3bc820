use thiserror::Error;

use crate::record::RecordId;
use crate::target::DocumentPath;

/// Errors from session operations (edits, selection, paste)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("edit mode is not active")]
    NotInEditMode,
    #[error("column '{0}' is read-only")]
    ReadOnlyColumn(String),
    #[error("row {row} is out of range ({count} visible rows)")]
    RowOutOfRange { row: usize, count: usize },
    #[error("column {col} is out of range ({count} visible columns)")]
    ColumnOutOfRange { col: usize, count: usize },
    #[error("record {0} no longer exists")]
    UnknownRecord(RecordId),
    #[error("delete was rejected by the host")]
    DeleteRejected,
}

/// A handler could not apply a value to its target
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    #[error("'{value}' is not a valid number for {column}")]
    InvalidNumber { column: String, value: String },
    #[error("invalid value '{value}' for {column}: {reason}")]
    InvalidValue {
        column: String,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Rejected(String),
}

/// A document could not be locked for writing
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot lock {document}: {reason}")]
pub struct LockError {
    pub document: DocumentPath,
    pub reason: String,
}
