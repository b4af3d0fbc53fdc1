use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Unified error type for canvasdoc operations
#[derive(Debug, Error)]
pub enum CanvasDocError {
    // IO errors
    /// Generic IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The host could not read the backing document.
    #[error("Failed to read document '{path}': {source}")]
    FileRead {
        /// Document path.
        path: PathBuf,
        /// Underlying host error.
        source: std::io::Error,
    },

    /// The debounced save could not write the document. The next change retries.
    #[error("Failed to persist document '{path}': {source}")]
    PersistenceFailed {
        /// Document path.
        path: PathBuf,
        /// Underlying host error.
        source: std::io::Error,
    },

    // Payload errors
    /// Malformed JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed YAML frontmatter.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The payload does not hold a readable document.
    #[error("Unable to decode document data: {0}")]
    Decode(String),

    /// The path's extension names no supported format.
    #[error("Unsupported document format for '{0}'")]
    UnsupportedFormat(PathBuf),

    // Legacy conflict errors
    /// The user dismissed the stale data prompt.
    #[error("Resolving stale store data for document {uuid} was cancelled")]
    ConflictResolutionCancelled {
        /// Document uuid.
        uuid: String,
    },

    /// The requesting view went away while the prompt was open.
    #[error("The view for document {uuid} was unloaded before stale store data was resolved")]
    ConflictResolutionViewUnloaded {
        /// Document uuid.
        uuid: String,
    },

    /// The legacy state store failed.
    #[error("Legacy store error: {0}")]
    LegacyStore(String),

    // Registry errors
    /// A second main store was built for a document that already has one.
    /// The creation gate makes this an internal invariant violation.
    #[error("A main store for '{0}' already exists")]
    DuplicateMainCreation(PathBuf),

    /// The handle's group was deleted or disposed.
    #[error("The store group for '{0}' has been disposed")]
    GroupDisposed(PathBuf),

    /// The registry was disposed.
    #[error("The store registry has been disposed")]
    RegistryDisposed,

    /// The registry was created outside a Tokio runtime.
    #[error("No Tokio runtime is available to drive the store registry")]
    NoRuntime,

    // Config errors
    /// Invalid config file.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config could not be written as TOML.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// No platform config directory.
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias for canvasdoc operations
pub type Result<T> = std::result::Result<T, CanvasDocError>;

impl CanvasDocError {
    /// Errors that only concern the caller that triggered them and should not
    /// be reported as failures (a dismissed dialog, a closed view).
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            CanvasDocError::ConflictResolutionCancelled { .. }
                | CanvasDocError::ConflictResolutionViewUnloaded { .. }
        )
    }

    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}

/// A serializable representation of CanvasDocError for IPC
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&CanvasDocError> for SerializableError {
    fn from(err: &CanvasDocError) -> Self {
        let kind = match err {
            CanvasDocError::Io(_) => "Io",
            CanvasDocError::FileRead { .. } => "FileRead",
            CanvasDocError::PersistenceFailed { .. } => "PersistenceFailed",
            CanvasDocError::Json(_) => "Json",
            CanvasDocError::Yaml(_) => "Yaml",
            CanvasDocError::Decode(_) => "Decode",
            CanvasDocError::UnsupportedFormat(_) => "UnsupportedFormat",
            CanvasDocError::ConflictResolutionCancelled { .. } => "ConflictResolutionCancelled",
            CanvasDocError::ConflictResolutionViewUnloaded { .. } => {
                "ConflictResolutionViewUnloaded"
            }
            CanvasDocError::LegacyStore(_) => "LegacyStore",
            CanvasDocError::DuplicateMainCreation(_) => "DuplicateMainCreation",
            CanvasDocError::GroupDisposed(_) => "GroupDisposed",
            CanvasDocError::RegistryDisposed => "RegistryDisposed",
            CanvasDocError::NoRuntime => "NoRuntime",
            CanvasDocError::ConfigParse(_) => "ConfigParse",
            CanvasDocError::ConfigSerialize(_) => "ConfigSerialize",
            CanvasDocError::NoConfigDir => "NoConfigDir",
        }
        .to_string();

        let path = match err {
            CanvasDocError::FileRead { path, .. } => Some(path.clone()),
            CanvasDocError::PersistenceFailed { path, .. } => Some(path.clone()),
            CanvasDocError::UnsupportedFormat(path) => Some(path.clone()),
            CanvasDocError::DuplicateMainCreation(path) => Some(path.clone()),
            CanvasDocError::GroupDisposed(path) => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<CanvasDocError> for SerializableError {
    fn from(err: CanvasDocError) -> Self {
        SerializableError::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_errors_are_silent() {
        let cancelled = CanvasDocError::ConflictResolutionCancelled {
            uuid: "abc".into(),
        };
        let unloaded = CanvasDocError::ConflictResolutionViewUnloaded {
            uuid: "abc".into(),
        };
        assert!(cancelled.is_silent());
        assert!(unloaded.is_silent());
        assert!(!CanvasDocError::RegistryDisposed.is_silent());
    }

    #[test]
    fn test_serializable_error_carries_path() {
        let err = CanvasDocError::PersistenceFailed {
            path: PathBuf::from("drawings/a.md"),
            source: std::io::Error::other("disk full"),
        };
        let serializable = err.to_serializable();
        assert_eq!(serializable.kind, "PersistenceFailed");
        assert_eq!(serializable.path, Some(PathBuf::from("drawings/a.md")));
        assert!(serializable.message.contains("disk full"));
    }
}
