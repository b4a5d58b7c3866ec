use std::path::PathBuf;

use thiserror::Error;

use crate::settings::SettingsError;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum FinderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file not found: {path}")]
    ConfigurationNotFound { path: PathBuf },

    #[error("Configuration parsing error: {path} - {details}")]
    ConfigurationParse { path: PathBuf, details: String },

    #[error("Bootstrap file not found: {path}")]
    BootstrapNotFound { path: PathBuf },

    #[error("Test file not found: {path}")]
    TestFileNotFound { path: PathBuf },

    #[error("Cannot resolve source file for test case: {class}")]
    UnresolvedTestCase { class: String },

    #[error("Cannot resolve base class {parent} of {class}")]
    UnresolvedBaseClass { class: String, parent: String },

    #[error("Invalid path pattern '{pattern}': {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<SettingsError> for FinderError {
    fn from(err: SettingsError) -> Self {
        FinderError::Settings(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, FinderError>;
