#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Data block codecs for `.md` and `.tldr` documents
pub mod codec;

/// Configuration options
pub mod config;

/// Document replicas and snapshots
pub mod document;

/// Error (common error types)
pub mod error;

/// Frontmatter parsing for markdown documents
pub mod frontmatter;

/// Host application collaborator (document I/O and change events)
pub mod host;

/// Residual state from the previous storage scheme
pub mod legacy;

/// Ordered listener registry
pub mod notifier;

/// Debounced persistence
pub mod persister;

/// Registry of shared documents
pub mod registry;

/// Views loading shared documents
pub mod view;

mod group;
mod reconciler;

pub use codec::Format;
pub use config::Config;
pub use document::{ChangeSource, DocumentMeta, DocumentStore, InstanceId, Snapshot};
pub use error::{CanvasDocError, Result, SerializableError};
pub use host::{DocumentHost, HostEvent, InMemoryHost};
pub use legacy::{LegacyStateStore, MemoryLegacyStore, NoLegacyState};
pub use registry::{InstanceHandle, InstanceOptions, StoreRegistry};
pub use view::{DocumentView, Loadable, ViewMode};
