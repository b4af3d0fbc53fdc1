//! Registry of shared documents.
//!
//! [`StoreRegistry`] maps the path of every open backing document to its
//! store group. The first [`register`](StoreRegistry::register) for a path
//! creates the main store (reading and decoding the document, then running
//! the legacy conflict check); later registrations attach a new instance to
//! the existing group. When the last instance unregisters, the group is
//! disposed after its pending save is flushed.
//!
//! Concurrent registrations for one path share a creation gate: while a main
//! store is being created, other registrations for the same path wait for it
//! and then attach to the result instead of creating a second one.
//!
//! # Example
//!
//! ```ignore
//! use canvasdoc_core::{Config, InstanceOptions, NoLegacyState, StoreRegistry};
//! use std::sync::Arc;
//!
//! let registry = StoreRegistry::new(Config::default(), Arc::new(host), Arc::new(NoLegacyState))?;
//! let handle = registry
//!     .register("drawings/plan.md", InstanceOptions::new().sync_to_main(true))
//!     .await?;
//! handle.store().put("shape:1", serde_json::json!({ "type": "geo" }));
//! handle.unregister();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::codec::{Format, codec_for};
use crate::config::Config;
use crate::document::{DocumentMeta, DocumentStore, InstanceId};
use crate::error::{CanvasDocError, Result};
use crate::group::{GroupInit, InstanceEntry, StoreGroup, UpdatedDataCallback};
use crate::host::DocumentHost;
use crate::legacy::{ConflictContext, LegacyConflictCheck, LegacyStateStore};
use crate::notifier::Subscription;
use crate::reconciler;

type CreationGate = Arc<AsyncMutex<()>>;

/// How a new instance is attached.
#[derive(Clone, Default)]
pub struct InstanceOptions {
    sync_to_main: bool,
    initial_payload: Option<String>,
    on_updated_data: Option<UpdatedDataCallback>,
    unload: CancellationToken,
}

impl InstanceOptions {
    /// A read-only mirror with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward local edits to the main store.
    pub fn sync_to_main(mut self, sync: bool) -> Self {
        self.sync_to_main = sync;
        self
    }

    /// Payload to build the main store from instead of reading the document.
    /// Ignored when the main store already exists.
    pub fn initial_payload(mut self, payload: impl Into<String>) -> Self {
        self.initial_payload = Some(payload.into());
        self
    }

    /// Called with the backing payload on registration, before every save
    /// and after every external change.
    pub fn on_updated_data<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_updated_data = Some(Arc::new(callback));
        self
    }

    /// Token cancelled when the registering view goes away. A conflict
    /// prompt still open at that point ends as "view unloaded".
    pub fn unload_token(mut self, token: CancellationToken) -> Self {
        self.unload = token;
        self
    }
}

impl std::fmt::Debug for InstanceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceOptions")
            .field("sync_to_main", &self.sync_to_main)
            .field("initial_payload", &self.initial_payload.is_some())
            .field("on_updated_data", &self.on_updated_data.is_some())
            .finish()
    }
}

pub(crate) struct RegistryInner {
    config: Config,
    host: Arc<dyn DocumentHost>,
    legacy: Arc<dyn LegacyStateStore>,
    runtime: Handle,
    groups: RwLock<HashMap<PathBuf, Arc<StoreGroup>>>,
    gates: Mutex<HashMap<PathBuf, CreationGate>>,
    next_instance_id: AtomicU64,
    main_creations: AtomicUsize,
    shutdown: CancellationToken,
    disposed: AtomicBool,
}

/// Owner of every store group.
pub struct StoreRegistry {
    inner: Arc<RegistryInner>,
}

impl StoreRegistry {
    /// Create a registry driven by the current Tokio runtime.
    pub fn new(
        config: Config,
        host: Arc<dyn DocumentHost>,
        legacy: Arc<dyn LegacyStateStore>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| CanvasDocError::NoRuntime)?;
        Ok(Self::with_runtime(config, host, legacy, runtime))
    }

    /// Create a registry that spawns its tasks on `runtime`.
    pub fn with_runtime(
        config: Config,
        host: Arc<dyn DocumentHost>,
        legacy: Arc<dyn LegacyStateStore>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                host,
                legacy,
                runtime,
                groups: RwLock::new(HashMap::new()),
                gates: Mutex::new(HashMap::new()),
                next_instance_id: AtomicU64::new(1),
                main_creations: AtomicUsize::new(0),
                shutdown: CancellationToken::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Configuration the registry was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Attach a new instance to the document at `path`, creating its main
    /// store if needed.
    pub async fn register(
        &self,
        path: impl AsRef<Path>,
        options: InstanceOptions,
    ) -> Result<InstanceHandle> {
        self.inner.register(path.as_ref(), options).await
    }

    /// Detach an instance by id. Returns `false` if it was not attached.
    pub fn unregister(&self, id: InstanceId) -> bool {
        let group = self
            .inner
            .groups
            .read()
            .unwrap()
            .values()
            .find(|group| group.instance(id).is_some())
            .cloned();
        match group {
            Some(group) => self.inner.unregister_instance(&group, id),
            None => false,
        }
    }

    /// Re-key the group registered under `old_path` to its current path.
    pub fn refresh_shared_id(&self, old_path: impl AsRef<Path>) -> bool {
        self.inner.refresh_shared_id(old_path.as_ref())
    }

    /// Dispose the group for `path` immediately, without flushing.
    pub fn dispose_group(&self, path: impl AsRef<Path>) -> bool {
        self.inner.dispose_group(path.as_ref())
    }

    /// Whether a document at `path` is open.
    pub fn has_group(&self, path: impl AsRef<Path>) -> bool {
        self.inner.groups.read().unwrap().contains_key(path.as_ref())
    }

    /// Number of open documents.
    pub fn group_count(&self) -> usize {
        self.inner.groups.read().unwrap().len()
    }

    /// Number of instances attached to the group for `path`.
    pub fn instance_count(&self, path: impl AsRef<Path>) -> usize {
        self.inner
            .group(path.as_ref())
            .map(|group| group.instance_count())
            .unwrap_or(0)
    }

    /// Number of main stores created so far.
    pub fn main_creations(&self) -> usize {
        self.inner.main_creations.load(Ordering::SeqCst)
    }

    /// The main store of the group for `path`.
    pub fn main_store(&self, path: impl AsRef<Path>) -> Option<Arc<DocumentStore>> {
        self.inner
            .group(path.as_ref())
            .map(|group| Arc::clone(group.main_document()))
    }

    /// Save the document at `path` now if a save is pending.
    pub async fn flush(&self, path: impl AsRef<Path>) -> Result<()> {
        match self.inner.group(path.as_ref()) {
            Some(group) => group.persister.flush_now().await,
            None => Ok(()),
        }
    }

    /// Save every document with a pending save.
    pub async fn flush_all(&self) -> Result<()> {
        let groups: Vec<_> = self.inner.groups.read().unwrap().values().cloned().collect();
        for group in groups {
            group.persister.flush_now().await?;
        }
        Ok(())
    }

    /// True once the registry was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Dispose every group and refuse further registrations. Open conflict
    /// prompts end as "view unloaded".
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();
        let groups: Vec<_> = self
            .inner
            .groups
            .write()
            .unwrap()
            .drain()
            .map(|(_, group)| group)
            .collect();
        log::info!("[StoreRegistry] Disposing {} groups", groups.len());
        for group in groups {
            group.shut_down();
            group.persister.dispose();
        }
        self.inner.gates.lock().unwrap().clear();
    }
}

impl Drop for StoreRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("groups", &self.group_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl RegistryInner {
    fn group(&self, path: &Path) -> Option<Arc<StoreGroup>> {
        self.groups.read().unwrap().get(path).cloned()
    }

    fn next_id(&self) -> InstanceId {
        self.next_instance_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn register(
        self: &Arc<Self>,
        path: &Path,
        options: InstanceOptions,
    ) -> Result<InstanceHandle> {
        let format = Format::from_path(path)?;
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CanvasDocError::RegistryDisposed);
        }

        // Fast path: the group already exists.
        if let Some(handle) = self.attach_existing(path, &options)? {
            return Ok(handle);
        }

        let gate = self.gate(path);
        let result = async {
            let _creating = gate.lock().await;
            if self.disposed.load(Ordering::SeqCst) {
                return Err(CanvasDocError::RegistryDisposed);
            }
            // Double-check: the group may have been created while we waited.
            if let Some(handle) = self.attach_existing(path, &options)? {
                return Ok(handle);
            }

            let group = self.create_group(path, format, &options).await?;
            let entry = self.install_group(path, group.clone(), &options)?;
            Ok(self.handle(group, entry))
        }
        .await;
        self.release_gate(path, gate);

        let handle = result?;
        handle.group.announce(&handle.entry);
        Ok(handle)
    }

    /// Publish a freshly created group and attach the registering instance.
    ///
    /// Only called under the path's creation gate. An existing entry means
    /// two main stores were built for one document; the newcomer is torn
    /// down and the existing group is left untouched.
    fn install_group(
        self: &Arc<Self>,
        path: &Path,
        group: Arc<StoreGroup>,
        options: &InstanceOptions,
    ) -> Result<Arc<InstanceEntry>> {
        let mut groups = self.groups.write().unwrap();
        let refusal = if self.disposed.load(Ordering::SeqCst) {
            Some(CanvasDocError::RegistryDisposed)
        } else if groups.contains_key(path) {
            log::error!(
                "[StoreRegistry] Second main store created for {}",
                path.display()
            );
            Some(CanvasDocError::DuplicateMainCreation(path.to_path_buf()))
        } else {
            None
        };
        if let Some(err) = refusal {
            drop(groups);
            group.shut_down();
            group.persister.dispose();
            return Err(err);
        }
        groups.insert(path.to_path_buf(), Arc::clone(&group));
        group.attach(self.next_id(), options.sync_to_main, options.on_updated_data.clone())
    }

    fn attach_existing(
        self: &Arc<Self>,
        path: &Path,
        options: &InstanceOptions,
    ) -> Result<Option<InstanceHandle>> {
        let attached = {
            let groups = self.groups.read().unwrap();
            match groups.get(path) {
                Some(group) => {
                    let entry = group.attach(
                        self.next_id(),
                        options.sync_to_main,
                        options.on_updated_data.clone(),
                    )?;
                    Some((Arc::clone(group), entry))
                }
                None => None,
            }
        };
        Ok(attached.map(|(group, entry)| {
            group.announce(&entry);
            self.handle(group, entry)
        }))
    }

    fn handle(self: &Arc<Self>, group: Arc<StoreGroup>, entry: Arc<InstanceEntry>) -> InstanceHandle {
        InstanceHandle {
            registry: Arc::downgrade(self),
            group,
            entry,
            unregistered: AtomicBool::new(false),
        }
    }

    /// Read, decode and resolve legacy state for a new main store.
    async fn create_group(
        self: &Arc<Self>,
        path: &Path,
        format: Format,
        options: &InstanceOptions,
    ) -> Result<Arc<StoreGroup>> {
        self.main_creations.fetch_add(1, Ordering::SeqCst);
        log::info!("[StoreRegistry] Creating main store for {}", path.display());

        let payload = match &options.initial_payload {
            Some(payload) => payload.clone(),
            None => self
                .host
                .read(path)
                .await
                .map_err(|source| CanvasDocError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })?,
        };
        let codec = codec_for(format, &self.config.app_version);
        let decoded = codec.decode(&payload)?;
        let mut snapshot = decoded.snapshot;
        let mut kept_legacy = false;

        if self.config.check_legacy_state && !decoded.skip_legacy_check {
            let context = ConflictContext {
                path: path.to_path_buf(),
                meta: decoded.meta.clone(),
            };
            let unload = self.linked_unload_token(&options.unload);
            let resolution = LegacyConflictCheck::new(self.legacy.as_ref(), context)
                .run(&unload)
                .await;
            unload.cancel();
            match resolution?.into_initial_snapshot() {
                Ok(Some(kept)) => {
                    snapshot = kept;
                    kept_legacy = true;
                }
                Ok(None) => {}
                Err(e) => {
                    if let CanvasDocError::ConflictResolutionCancelled { .. } = e {
                        log::warn!("[StoreRegistry] Opening {} cancelled: {}", path.display(), e);
                    }
                    return Err(e);
                }
            }
        }

        let group = StoreGroup::new(
            GroupInit {
                shared_id: path.to_path_buf(),
                format,
                codec,
                meta: decoded.meta,
                snapshot,
                payload,
            },
            &self.config,
            Arc::clone(&self.host),
            self.runtime.clone(),
        );
        group.set_host_subscription(reconciler::install(&group, Arc::downgrade(self)));
        if kept_legacy {
            group.persister.schedule();
        }
        Ok(group)
    }

    /// A token cancelled by either the view's unload token or registry
    /// disposal. Cancel it when done to stop the relay task.
    fn linked_unload_token(&self, view: &CancellationToken) -> CancellationToken {
        let linked = self.shutdown.child_token();
        let view = view.clone();
        let relay = linked.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = view.cancelled() => relay.cancel(),
                _ = relay.cancelled() => {}
            }
        });
        linked
    }

    fn gate(&self, path: &Path) -> CreationGate {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(gates.entry(path.to_path_buf()).or_default())
    }

    fn release_gate(&self, path: &Path, gate: CreationGate) {
        let mut gates = self.gates.lock().unwrap();
        // One reference in the map, one here: nobody else is waiting.
        if let Some(current) = gates.get(path)
            && Arc::ptr_eq(current, &gate)
            && Arc::strong_count(&gate) <= 2
        {
            gates.remove(path);
        }
    }

    pub(crate) fn unregister_instance(self: &Arc<Self>, group: &Arc<StoreGroup>, id: InstanceId) -> bool {
        let emptied = {
            let mut groups = self.groups.write().unwrap();
            match group.detach(id) {
                None => return false,
                Some(remaining) if remaining > 0 => false,
                Some(_) => {
                    let key = group.shared_id();
                    if groups.get(&key).is_some_and(|g| Arc::ptr_eq(g, group)) {
                        groups.remove(&key);
                    }
                    true
                }
            }
        };
        if emptied {
            self.close_after_flush(Arc::clone(group));
        }
        true
    }

    /// Shut a group down, then write its pending save while holding the
    /// creation gate so that a new main store reads the saved payload.
    fn close_after_flush(self: &Arc<Self>, group: Arc<StoreGroup>) {
        group.shut_down();
        if !group.persister.is_pending() {
            group.persister.dispose();
            return;
        }

        let path = group.shared_id();
        let gate = self.gate(&path);
        let held = Arc::clone(&gate).try_lock_owned().ok();
        let registry = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let guard = match held {
                Some(guard) => guard,
                None => Arc::clone(&gate).lock_owned().await,
            };
            if let Err(e) = group.persister.flush_now().await {
                log::warn!("[StoreRegistry] Final save of {} failed: {}", path.display(), e);
            }
            group.persister.dispose();
            drop(guard);
            if let Some(registry) = registry.upgrade() {
                registry.release_gate(&path, gate);
            }
        });
    }

    pub(crate) fn refresh_shared_id(&self, old_path: &Path) -> bool {
        let mut groups = self.groups.write().unwrap();
        let Some(group) = groups.remove(old_path) else {
            return false;
        };
        let new_path = group.shared_id();
        if new_path == old_path {
            groups.insert(new_path, group);
            return false;
        }
        if groups.contains_key(&new_path) {
            log::warn!(
                "[StoreRegistry] {} is already open; keeping {} under its old path",
                new_path.display(),
                old_path.display()
            );
            group.set_shared_id(old_path.to_path_buf());
            groups.insert(old_path.to_path_buf(), group);
            return false;
        }
        log::info!(
            "[StoreRegistry] Re-keyed {} to {}",
            old_path.display(),
            new_path.display()
        );
        groups.insert(new_path, group);
        true
    }

    pub(crate) fn dispose_group(&self, path: &Path) -> bool {
        let group = self.groups.write().unwrap().remove(path);
        match group {
            Some(group) => {
                group.shut_down();
                group.persister.dispose();
                true
            }
            None => false,
        }
    }
}

/// One attached instance. Dropping the handle unregisters it.
pub struct InstanceHandle {
    registry: Weak<RegistryInner>,
    group: Arc<StoreGroup>,
    entry: Arc<InstanceEntry>,
    unregistered: AtomicBool,
}

impl InstanceHandle {
    /// Registry-wide id of this instance.
    pub fn id(&self) -> InstanceId {
        self.entry.id
    }

    /// This instance's replica.
    pub fn store(&self) -> Arc<DocumentStore> {
        Arc::clone(&self.entry.document)
    }

    /// Metadata of the shared document.
    pub fn meta(&self) -> &DocumentMeta {
        self.group.meta()
    }

    /// Current path of the backing document.
    pub fn shared_id(&self) -> PathBuf {
        self.group.shared_id()
    }

    /// Whether the instance is still attached to a live group.
    pub fn is_attached(&self) -> bool {
        !self.unregistered.load(Ordering::SeqCst)
            && !self.group.is_disposed()
            && self.group.instance(self.entry.id).is_some()
    }

    /// Promote the instance (local edits flow to main) or demote it to a
    /// mirror. Fails with `GroupDisposed` once detached.
    pub fn sync_to_main(&self, sync: bool) -> Result<()> {
        self.group.set_sync_to_main(self.entry.id, sync)
    }

    /// Whether local edits currently flow into the main store.
    pub fn is_synchronizing_to_main(&self) -> bool {
        self.entry.is_synchronizing_to_main()
    }

    /// Listen for persistence errors of the shared document.
    pub fn on_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CanvasDocError) + Send + Sync + 'static,
    {
        self.entry.errors.add_listener(callback)
    }

    /// Save the shared document now if a save is pending.
    pub async fn flush(&self) -> Result<()> {
        if !self.is_attached() {
            return Err(CanvasDocError::GroupDisposed(self.group.shared_id()));
        }
        self.group.persister.flush_now().await
    }

    /// Detach the instance. Calling it again does nothing.
    pub fn unregister(&self) {
        if self.unregistered.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.registry.upgrade() {
            Some(registry) => {
                registry.unregister_instance(&self.group, self.entry.id);
            }
            None => {
                self.group.detach(self.entry.id);
            }
        }
    }
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("id", &self.entry.id)
            .field("shared_id", &self.group.shared_id())
            .field("sync_to_main", &self.is_synchronizing_to_main())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use crate::legacy::NoLegacyState;

    const DOC: &str = r#"{"meta":{"uuid":"u1","app_version":"1.0.0"},"records":{}}"#;

    fn registry(host: &InMemoryHost) -> StoreRegistry {
        StoreRegistry::new(
            Config::default(),
            Arc::new(host.clone()),
            Arc::new(NoLegacyState),
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = StoreRegistry::new(
            Config::default(),
            Arc::new(InMemoryHost::new()),
            Arc::new(NoLegacyState),
        );
        assert!(matches!(result, Err(CanvasDocError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_unsupported_format_leaves_no_state() {
        let host = InMemoryHost::new().with_file("notes.txt", "plain");
        let registry = registry(&host);
        let result = registry.register("notes.txt", InstanceOptions::new()).await;
        assert!(matches!(result, Err(CanvasDocError::UnsupportedFormat(_))));
        assert_eq!(registry.group_count(), 0);
        assert_eq!(registry.main_creations(), 0);
        assert_eq!(host.read_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_document_fails_cleanly() {
        let host = InMemoryHost::new();
        let registry = registry(&host);
        let result = registry.register("gone.tldr", InstanceOptions::new()).await;
        assert!(matches!(result, Err(CanvasDocError::FileRead { .. })));
        assert!(!registry.has_group("gone.tldr"));
    }

    #[tokio::test]
    async fn test_second_main_store_is_refused() {
        let host = InMemoryHost::new().with_file("a.tldr", DOC);
        let registry = registry(&host);
        let inner = &registry.inner;
        let path = Path::new("a.tldr");
        let options = InstanceOptions::new();

        let first = inner.create_group(path, Format::Tldr, &options).await.unwrap();
        let second = inner.create_group(path, Format::Tldr, &options).await.unwrap();
        inner.install_group(path, Arc::clone(&first), &options).unwrap();

        assert!(matches!(
            inner.install_group(path, Arc::clone(&second), &options),
            Err(CanvasDocError::DuplicateMainCreation(_))
        ));
        assert!(second.is_disposed());
        assert!(!first.is_disposed());
        assert_eq!(registry.group_count(), 1);
        assert!(Arc::ptr_eq(
            registry.main_store("a.tldr").as_ref().unwrap(),
            first.main_document()
        ));
    }

    #[tokio::test]
    async fn test_unregister_by_id_is_idempotent() {
        let host = InMemoryHost::new().with_file("a.tldr", DOC);
        let registry = registry(&host);
        let handle = registry.register("a.tldr", InstanceOptions::new()).await.unwrap();

        assert!(registry.unregister(handle.id()));
        assert!(!registry.unregister(handle.id()));
        assert!(!registry.has_group("a.tldr"));
        assert!(!handle.is_attached());
        handle.unregister();
    }

    #[tokio::test]
    async fn test_initial_payload_skips_read() {
        let host = InMemoryHost::new();
        let registry = registry(&host);
        let handle = registry
            .register("a.tldr", InstanceOptions::new().initial_payload(DOC))
            .await
            .unwrap();
        assert_eq!(handle.meta().uuid, "u1");
        assert_eq!(host.read_count(), 0);
    }

    #[tokio::test]
    async fn test_register_after_dispose() {
        let host = InMemoryHost::new().with_file("a.tldr", DOC);
        let registry = registry(&host);
        let handle = registry.register("a.tldr", InstanceOptions::new()).await.unwrap();

        registry.dispose();
        assert_eq!(registry.group_count(), 0);
        assert!(!handle.is_attached());
        assert!(matches!(
            registry.register("a.tldr", InstanceOptions::new()).await,
            Err(CanvasDocError::RegistryDisposed)
        ));
    }

    #[tokio::test]
    async fn test_refresh_shared_id_keeps_group_when_target_is_open() {
        let host = InMemoryHost::new()
            .with_file("a.tldr", DOC)
            .with_file("b.tldr", DOC);
        let registry = registry(&host);
        let a = registry.register("a.tldr", InstanceOptions::new()).await.unwrap();
        let _b = registry.register("b.tldr", InstanceOptions::new()).await.unwrap();

        a.group.set_shared_id(PathBuf::from("b.tldr"));
        assert!(!registry.refresh_shared_id("a.tldr"));
        assert!(registry.has_group("a.tldr"));
        assert_eq!(a.shared_id(), PathBuf::from("a.tldr"));
    }
}
