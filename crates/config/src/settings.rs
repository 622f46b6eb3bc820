// Grid settings
// Loaded from ~/.config/gridsift/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gridsift_engine::debounce::Debouncer;
use gridsift_engine::edit::EditablePolicy;
use gridsift_engine::view::AutoSize;
use gridsift_engine::SessionOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Filtering
    #[serde(rename = "filter.debounceThreshold")]
    pub debounce_threshold: usize,

    #[serde(rename = "filter.debounceMillis")]
    pub debounce_millis: u64,

    // Editing
    #[serde(rename = "edit.editableColumns")]
    pub editable_columns: Vec<String>,

    #[serde(rename = "edit.editablePrefixes")]
    pub editable_prefixes: Vec<String>,

    // Export
    #[serde(rename = "export.delimiter")]
    pub export_delimiter: char,

    #[serde(rename = "export.includeHeaders")]
    pub export_include_headers: bool,

    // View
    #[serde(rename = "view.autoSizeScanRows")]
    pub autosize_scan_rows: usize,

    #[serde(rename = "view.minColumnWidth")]
    pub min_column_width: usize,

    #[serde(rename = "view.maxColumnWidth")]
    pub max_column_width: usize,

    // Session window
    #[serde(rename = "session.spanAllScreens")]
    pub span_all_screens: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_threshold: 2000,
            debounce_millis: 250,
            editable_columns: [
                "Name", "Layer", "Color", "Linetype", "Rotation", "CenterX", "CenterY", "Radius", "Contents",
                "Height", "Scale", "Description",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            editable_prefixes: vec!["attr:".to_string()],
            export_delimiter: ',',
            export_include_headers: true,
            autosize_scan_rows: 200,
            min_column_width: 3,
            max_column_width: 40,
            span_all_screens: false,
        }
    }
}

/// Drop `//` comment lines so the file can document itself
fn strip_comments(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridsift");
        config_dir.join("settings.json")
    }

    /// Parse settings text (comments allowed)
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(&strip_comments(contents))?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = Self::create_default_file(&path) {
                log::warn!("{}", e);
            }
            return settings;
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Save current settings to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(write_err)
    }

    /// Create default settings file with comments
    fn create_default_file(path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let default_config = r#"{
    // Re-filter on every keystroke up to this many records,
    // above it wait for a pause in typing
    "filter.debounceThreshold": 2000,
    "filter.debounceMillis": 250,

    // Columns that can be edited in edit mode (F2).
    // Prefixes cover dynamic families such as block attributes.
    "edit.editableColumns": ["Name", "Layer", "Color", "Linetype", "Rotation",
        "CenterX", "CenterY", "Radius", "Contents", "Height", "Scale", "Description"],
    "edit.editablePrefixes": ["attr:"],

    // Export of the visible rows
    "export.delimiter": ",",
    "export.includeHeaders": true,

    // Column auto-size, measured once per session
    "view.autoSizeScanRows": 200,
    "view.minColumnWidth": 3,
    "view.maxColumnWidth": 40,

    // Stretch the grid columns across the whole terminal width
    "session.spanAllScreens": false
}
"#;

        fs::write(path, default_config).map_err(write_err)
    }

    /// Get the config file path for display/opening
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }

    pub fn editable_policy(&self) -> EditablePolicy {
        EditablePolicy::new(&self.editable_columns, &self.editable_prefixes)
    }

    pub fn autosize(&self) -> AutoSize {
        AutoSize {
            scan_rows: self.autosize_scan_rows,
            min_width: self.min_column_width,
            max_width: self.max_column_width.max(self.min_column_width),
        }
    }

    pub fn debouncer(&self) -> Debouncer {
        Debouncer::new(self.debounce_threshold, Duration::from_millis(self.debounce_millis))
    }

    /// Session options carrying these settings; host-specific fields
    /// (selection, delete callback) are left at their defaults
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            span_all_screens: self.span_all_screens,
            editable: self.editable_policy(),
            debounce: self.debouncer(),
            autosize: self.autosize(),
            ..SessionOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let s = Settings::from_json_str(
            r#"{
            // comment line
            "filter.debounceThreshold": 10,
            "export.delimiter": "\t"
        }"#,
        )
        .unwrap();
        assert_eq!(s.debounce_threshold, 10);
        assert_eq!(s.export_delimiter, '\t');
        assert_eq!(s.debounce_millis, 250);
        assert!(s.editable_columns.contains(&"Rotation".to_string()));
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(matches!(Settings::from_json_str("{ nope"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridsift").join("settings.json");
        Settings::create_default_file(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut s = Settings::default();
        s.span_all_screens = true;
        s.editable_prefixes.push("xdata:".into());
        s.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), s);
    }

    #[test]
    fn test_engine_options() {
        let mut s = Settings::default();
        s.editable_columns = vec!["Name".into()];
        s.min_column_width = 8;
        s.max_column_width = 4;
        let policy = s.editable_policy();
        assert!(policy.is_editable("name"));
        assert!(policy.is_editable("attr:TAG"));
        assert!(!policy.is_editable("Layer"));
        let options = s.session_options();
        assert_eq!(options.autosize.max_width, 8);
        assert_eq!(options.debounce.threshold(), 2000);
    }
}
