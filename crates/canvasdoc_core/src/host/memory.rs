//! In-memory [`DocumentHost`] implementation.

use std::collections::HashMap;
use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::{AssetStore, AssetStoreContext, BoxFuture, DocumentHost, HostEvent, HostEventCallback};
use crate::notifier::{Notifier, Subscription};

#[derive(Default)]
struct Inner {
    /// Documents stored as path -> payload.
    files: RwLock<HashMap<PathBuf, String>>,
    events: Notifier<HostEvent>,
    /// Every successful engine write, in order.
    writes: Mutex<Vec<(PathBuf, String)>>,
    fail_writes: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
    asset_stores_enabled: AtomicBool,
    asset_contexts: Mutex<Vec<AssetStoreContext>>,
    live_asset_stores: Arc<AtomicUsize>,
}

/// A document host that keeps payloads in memory.
///
/// Writes made through [`DocumentHost::write`] emit [`HostEvent::Modified`]
/// like a real file watcher would. The `external_*`, [`rename`](Self::rename)
/// and [`delete`](Self::delete) helpers simulate other programs touching the
/// documents.
#[derive(Clone, Default)]
pub struct InMemoryHost {
    inner: Arc<Inner>,
}

impl InMemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document (builder pattern). Emits no event.
    pub fn with_file(self, path: impl Into<PathBuf>, payload: impl Into<String>) -> Self {
        self.inner
            .files
            .write()
            .unwrap()
            .insert(path.into(), payload.into());
        self
    }

    /// Create asset-store proxies for markdown documents.
    pub fn with_asset_stores(self) -> Self {
        self.inner.asset_stores_enabled.store(true, Ordering::SeqCst);
        self
    }

    /// Current payload of a document.
    pub fn content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.inner.files.read().unwrap().get(path.as_ref()).cloned()
    }

    /// Number of successful writes to `path`.
    pub fn write_count(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        self.inner
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }

    /// Payloads written to `path`, oldest first.
    pub fn written_payloads(&self, path: impl AsRef<Path>) -> Vec<String> {
        let path = path.as_ref();
        self.inner
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Number of reads served.
    pub fn read_count(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every read by `delay`, to widen race windows in tests.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.inner.read_delay.lock().unwrap() = delay;
    }

    /// Number of event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.listener_count()
    }

    /// Number of asset-store proxies created and not yet disposed.
    pub fn live_asset_stores(&self) -> usize {
        self.inner.live_asset_stores.load(Ordering::SeqCst)
    }

    /// Emit an arbitrary event.
    pub fn emit(&self, event: HostEvent) {
        self.inner.events.notify(&event);
    }

    /// Another program wrote the document.
    pub fn external_write(&self, path: impl Into<PathBuf>, payload: impl Into<String>) {
        let path = path.into();
        self.inner
            .files
            .write()
            .unwrap()
            .insert(path.clone(), payload.into());
        self.emit(HostEvent::modified(path));
    }

    /// Another editor previews an unsaved payload.
    pub fn quick_preview(&self, path: impl Into<PathBuf>, payload: impl Into<String>) {
        self.emit(HostEvent::quick_preview(path, payload));
    }

    /// Rename a document. Returns `false` if it did not exist.
    pub fn rename(&self, old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> bool {
        let (old_path, new_path) = (old_path.into(), new_path.into());
        let moved = {
            let mut files = self.inner.files.write().unwrap();
            match files.remove(&old_path) {
                Some(payload) => {
                    files.insert(new_path.clone(), payload);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.emit(HostEvent::renamed(old_path, new_path));
        }
        moved
    }

    /// Delete a document. Returns `false` if it did not exist.
    pub fn delete(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let removed = self.inner.files.write().unwrap().remove(&path).is_some();
        if removed {
            self.emit(HostEvent::deleted(path));
        }
        removed
    }

    /// Embed an asset into a markdown document: the proxy hands the new
    /// contents to the engine, then the file is written.
    pub fn embed_asset(&self, path: impl Into<PathBuf>, new_contents: impl Into<String>) {
        let (path, new_contents) = (path.into(), new_contents.into());
        let sinks: Vec<_> = self
            .inner
            .asset_contexts
            .lock()
            .unwrap()
            .iter()
            .filter(|ctx| ctx.path == path)
            .map(|ctx| Arc::clone(&ctx.sink))
            .collect();
        for sink in sinks {
            sink(new_contents.clone());
        }
        self.inner
            .files
            .write()
            .unwrap()
            .insert(path.clone(), new_contents);
        self.emit(HostEvent::modified(path));
    }
}

impl DocumentHost for InMemoryHost {
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let delay = *self.inner.read_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.reads.fetch_add(1, Ordering::SeqCst);
            self.content(path)
                .ok_or_else(|| Error::new(ErrorKind::NotFound, "Document not found"))
        })
    }

    fn write<'a>(&'a self, path: &'a Path, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.inner.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::other("Simulated write failure"));
            }
            self.inner
                .files
                .write()
                .unwrap()
                .insert(path.to_path_buf(), payload.to_string());
            self.inner
                .writes
                .lock()
                .unwrap()
                .push((path.to_path_buf(), payload.to_string()));
            self.emit(HostEvent::modified(path));
            Ok(())
        })
    }

    fn subscribe(&self, callback: HostEventCallback) -> Subscription {
        self.inner.events.add_listener(move |event| callback(event))
    }

    fn create_asset_store(&self, context: AssetStoreContext) -> Option<Box<dyn AssetStore>> {
        if !self.inner.asset_stores_enabled.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.asset_contexts.lock().unwrap().push(context.clone());
        self.inner.live_asset_stores.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MemoryAssetStore {
            inner: Arc::downgrade(&self.inner),
            uuid: context.uuid,
            disposed: AtomicBool::new(false),
        }))
    }
}

struct MemoryAssetStore {
    inner: std::sync::Weak<Inner>,
    uuid: String,
    disposed: AtomicBool,
}

impl AssetStore for MemoryAssetStore {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner
                .asset_contexts
                .lock()
                .unwrap()
                .retain(|ctx| ctx.uuid != self.uuid);
            inner.live_asset_stores.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
