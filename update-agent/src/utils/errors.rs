//! Error types for the update engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Invalid version '{version}': {reason}")]
    VersionParse { version: String, reason: String },

    #[error("Download error: {0}")]
    Download(String),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    Checksum {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("No backup found for version {version} at {path}")]
    NoBackup { version: String, path: String },

    #[error("Rollback failed after '{cause}': {rollback}")]
    RollbackFailed {
        cause: Box<UpdateError>,
        rollback: Box<UpdateError>,
    },
}

impl UpdateError {
    /// Stable label used as the `error_kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::Config(_) => "config",
            UpdateError::Io(_) => "io",
            UpdateError::Network(_) => "network",
            UpdateError::Manifest(_) => "manifest",
            UpdateError::VersionParse { .. } => "version_parse",
            UpdateError::Download(_) => "download",
            UpdateError::Checksum { .. } => "checksum",
            UpdateError::Backup(_) => "backup",
            UpdateError::Extraction(_) => "extraction",
            UpdateError::NoBackup { .. } => "no_backup",
            UpdateError::RollbackFailed { .. } => "rollback_failed",
        }
    }

    /// The installation may be left partially updated; no automated recovery follows.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UpdateError::NoBackup { .. } | UpdateError::RollbackFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
