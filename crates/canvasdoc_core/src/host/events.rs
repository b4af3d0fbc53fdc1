//! Events reported by a [`DocumentHost`](super::DocumentHost).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ts_rs::TS;

/// Change to a backing document observed by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type")]
pub enum HostEvent {
    /// The document was written (by this process or another program).
    Modified {
        /// Path of the document.
        path: PathBuf,
        /// New payload, when the host already has it. Otherwise it is read.
        #[serde(default)]
        payload: Option<String>,
    },

    /// The document was renamed or moved.
    Renamed {
        /// Path before the rename.
        old_path: PathBuf,
        /// Path after the rename.
        new_path: PathBuf,
    },

    /// The document was deleted.
    Deleted {
        /// Path of the deleted document.
        path: PathBuf,
    },

    /// Another editor shows an unsaved payload for the document.
    QuickPreview {
        /// Path of the document.
        path: PathBuf,
        /// The previewed payload.
        payload: String,
    },
}

impl HostEvent {
    /// Create a Modified event without a payload.
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::Modified {
            path: path.into(),
            payload: None,
        }
    }

    /// Create a Modified event carrying the new payload.
    pub fn modified_with_payload(path: impl Into<PathBuf>, payload: impl Into<String>) -> Self {
        Self::Modified {
            path: path.into(),
            payload: Some(payload.into()),
        }
    }

    /// Create a Renamed event.
    pub fn renamed(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
        Self::Renamed {
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }

    /// Create a Deleted event.
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::Deleted { path: path.into() }
    }

    /// Create a QuickPreview event.
    pub fn quick_preview(path: impl Into<PathBuf>, payload: impl Into<String>) -> Self {
        Self::QuickPreview {
            path: path.into(),
            payload: payload.into(),
        }
    }

    /// The path the event is about (the old path for renames).
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified { path, .. } => path,
            Self::Renamed { old_path, .. } => old_path,
            Self::Deleted { path } => path,
            Self::QuickPreview { path, .. } => path,
        }
    }
}
