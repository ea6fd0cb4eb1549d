//! Error taxonomy for the task core.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DaybookError>;

#[derive(Error, Debug)]
pub enum DaybookError {
    /// Rejected user input. Nothing was mutated.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DaybookError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Failures of the key/value persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage i/o error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage unavailable for '{key}': {reason}")]
    Unavailable { key: String, reason: String },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
