use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Format(String),
}

impl IoError {
    pub(crate) fn file(path: &std::path::Path, source: std::io::Error) -> Self {
        IoError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}
