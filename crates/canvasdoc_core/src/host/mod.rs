//! Host application collaborator.
//!
//! The registry never touches the filesystem itself. Reading, writing and
//! change notifications for backing documents all go through a
//! [`DocumentHost`], which the embedding application implements on top of
//! its own file API (a vault, a browser storage layer, plain `std::fs` with a
//! watcher, ...).
//!
//! [`InMemoryHost`] is a complete implementation backed by a map, used by the
//! tests and by embedders that keep documents in memory.
//!
//! ## Object safety
//!
//! `DocumentHost` is used behind `Arc<dyn DocumentHost>`, so async methods
//! return boxed futures.

mod events;
mod memory;

pub use events::HostEvent;
pub use memory::InMemoryHost;

use std::future::Future;
use std::io::Result;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::notifier::Subscription;

/// A boxed future for object-safe async methods.
///
/// On native targets, futures are `Send` for compatibility with multi-threaded runtimes.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed future for object-safe async methods.
///
/// WASM version without `Send` requirement - JavaScript is single-threaded.
#[cfg(target_arch = "wasm32")]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Callback for host events.
pub type HostEventCallback = Arc<dyn Fn(&HostEvent) + Send + Sync>;

/// Callback receiving the new payload of a document after an asset was embedded.
pub type AssetSink = Arc<dyn Fn(String) + Send + Sync>;

/// Everything an asset-store proxy needs to know about its document.
#[derive(Clone)]
pub struct AssetStoreContext {
    /// Backing document path at the time the proxy was created.
    pub path: PathBuf,
    /// Stable document id.
    pub uuid: String,
    /// Call with the document's new contents after writing an asset link into it.
    pub sink: AssetSink,
}

impl std::fmt::Debug for AssetStoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStoreContext")
            .field("path", &self.path)
            .field("uuid", &self.uuid)
            .finish()
    }
}

/// Proxy that stores binary attachments referenced by a markdown document.
///
/// Owned by the main store of a document and disposed with it.
pub trait AssetStore: Send + Sync {
    /// Release every resource held by the proxy.
    fn dispose(&self);
}

/// Access to backing documents and their change notifications.
pub trait DocumentHost: Send + Sync {
    /// Read the current payload of a document.
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>>;

    /// Replace the payload of a document.
    fn write<'a>(&'a self, path: &'a Path, payload: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Subscribe to modifications, renames and deletions of any document.
    ///
    /// The subscription lasts until the returned handle is dropped.
    fn subscribe(&self, callback: HostEventCallback) -> Subscription;

    /// Create the asset-store proxy for a markdown document.
    ///
    /// Default implementation: documents have no asset proxy.
    fn create_asset_store(&self, _context: AssetStoreContext) -> Option<Box<dyn AssetStore>> {
        None
    }
}
