//! One backing document with its main store and attached instances.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use indexmap::IndexMap;
use tokio::runtime::Handle;

use crate::codec::{Format, SnapshotCodec};
use crate::config::Config;
use crate::document::{ChangeSource, DocumentMeta, DocumentStore, InstanceId, Snapshot};
use crate::error::{CanvasDocError, Result};
use crate::host::{AssetStore, AssetStoreContext, DocumentHost};
use crate::notifier::{Notifier, Subscription};
use crate::persister::{DebouncedPersister, PersistAction, PersistErrorCallback};

/// Receives the backing payload whenever it changes.
pub type UpdatedDataCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Default)]
struct Payloads {
    /// Last payload written to or read from the backing document.
    last_persisted: String,
    /// Payload of the write in progress.
    in_flight: Option<String>,
}

struct MainEntry {
    document: Arc<DocumentStore>,
    format: Format,
    codec: Arc<dyn SnapshotCodec>,
    payloads: Mutex<Payloads>,
}

/// One attached view.
pub(crate) struct InstanceEntry {
    pub(crate) id: InstanceId,
    pub(crate) document: Arc<DocumentStore>,
    sync_to_main: AtomicBool,
    on_updated_data: Option<UpdatedDataCallback>,
    pub(crate) errors: Notifier<CanvasDocError>,
    listener: Mutex<Option<Subscription>>,
}

impl InstanceEntry {
    pub(crate) fn is_synchronizing_to_main(&self) -> bool {
        self.sync_to_main.load(Ordering::SeqCst)
    }

    fn updated_data(&self, payload: &str) {
        if let Some(callback) = &self.on_updated_data {
            callback(payload);
        }
    }
}

/// What a new group is built from.
pub(crate) struct GroupInit {
    pub shared_id: PathBuf,
    pub format: Format,
    pub codec: Arc<dyn SnapshotCodec>,
    pub meta: DocumentMeta,
    pub snapshot: Snapshot,
    pub payload: String,
}

/// The unit of sharing: one main store plus every attached instance.
pub(crate) struct StoreGroup {
    shared_id: RwLock<PathBuf>,
    main: MainEntry,
    instances: RwLock<IndexMap<InstanceId, Arc<InstanceEntry>>>,
    pub(crate) persister: DebouncedPersister,
    host: Arc<dyn DocumentHost>,
    runtime: Handle,
    disposed: AtomicBool,
    main_listener: Mutex<Option<Subscription>>,
    host_subscription: Mutex<Option<Subscription>>,
    asset_store: Mutex<Option<Box<dyn AssetStore>>>,
}

impl StoreGroup {
    /// Build a group and start listening to its main store.
    pub(crate) fn new(
        init: GroupInit,
        config: &Config,
        host: Arc<dyn DocumentHost>,
        runtime: Handle,
    ) -> Arc<Self> {
        let group = Arc::new_cyclic(|weak: &Weak<StoreGroup>| {
            let action: PersistAction = {
                let weak = weak.clone();
                Arc::new(move || {
                    let weak = weak.clone();
                    Box::pin(async move {
                        match weak.upgrade() {
                            Some(group) => group.persist().await,
                            None => Ok(()),
                        }
                    })
                })
            };
            let on_error: PersistErrorCallback = {
                let weak = weak.clone();
                Arc::new(move |error| {
                    if let Some(group) = weak.upgrade() {
                        group.report_error(error);
                    }
                })
            };

            StoreGroup {
                shared_id: RwLock::new(init.shared_id),
                main: MainEntry {
                    document: Arc::new(DocumentStore::new(init.meta, init.snapshot)),
                    format: init.format,
                    codec: init.codec,
                    payloads: Mutex::new(Payloads {
                        last_persisted: init.payload,
                        in_flight: None,
                    }),
                },
                instances: RwLock::new(IndexMap::new()),
                persister: DebouncedPersister::new(
                    runtime.clone(),
                    config.save_delay(),
                    config.max_save_wait(),
                    config.leading_save,
                    action,
                    on_error,
                ),
                host,
                runtime,
                disposed: AtomicBool::new(false),
                main_listener: Mutex::new(None),
                host_subscription: Mutex::new(None),
                asset_store: Mutex::new(None),
            }
        });

        let weak = Arc::downgrade(&group);
        let listener = group.main.document.listen(move |change| {
            if let Some(group) = weak.upgrade() {
                group.on_main_changed(change.source);
            }
        });
        *group.main_listener.lock().unwrap() = Some(listener);

        if group.main.format == Format::Markdown {
            group.create_asset_store();
        }
        group
    }

    pub(crate) fn shared_id(&self) -> PathBuf {
        self.shared_id.read().unwrap().clone()
    }

    pub(crate) fn set_shared_id(&self, shared_id: PathBuf) {
        *self.shared_id.write().unwrap() = shared_id;
    }

    pub(crate) fn is_shared_id(&self, path: &Path) -> bool {
        *self.shared_id.read().unwrap() == path
    }

    pub(crate) fn meta(&self) -> &DocumentMeta {
        self.main.document.meta()
    }

    pub(crate) fn main_document(&self) -> &Arc<DocumentStore> {
        &self.main.document
    }

    pub(crate) fn host(&self) -> &Arc<dyn DocumentHost> {
        &self.host
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn last_persisted(&self) -> String {
        self.main.payloads.lock().unwrap().last_persisted.clone()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn instance_count(&self) -> usize {
        self.instances.read().unwrap().len()
    }

    pub(crate) fn instance(&self, id: InstanceId) -> Option<Arc<InstanceEntry>> {
        self.instances.read().unwrap().get(&id).cloned()
    }

    fn instances_snapshot(&self) -> Vec<Arc<InstanceEntry>> {
        self.instances.read().unwrap().values().cloned().collect()
    }

    /// Keep the host subscription alive for the lifetime of the group.
    pub(crate) fn set_host_subscription(&self, subscription: Subscription) {
        *self.host_subscription.lock().unwrap() = Some(subscription);
    }

    fn create_asset_store(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let context = AssetStoreContext {
            path: self.shared_id(),
            uuid: self.meta().uuid.clone(),
            sink: Arc::new(move |contents: String| {
                if let Some(group) = weak.upgrade() {
                    group.propagate_payload(contents);
                }
            }),
        };
        *self.asset_store.lock().unwrap() = self.host.create_asset_store(context);
    }

    /// Attach a new instance seeded from the main store.
    ///
    /// The caller invokes [`StoreGroup::announce`] once no registry lock is held.
    pub(crate) fn attach(
        self: &Arc<Self>,
        id: InstanceId,
        sync_to_main: bool,
        on_updated_data: Option<UpdatedDataCallback>,
    ) -> Result<Arc<InstanceEntry>> {
        if self.is_disposed() {
            return Err(CanvasDocError::GroupDisposed(self.shared_id()));
        }

        let document = Arc::new(DocumentStore::new(
            self.meta().clone(),
            self.main.document.snapshot(),
        ));
        let entry = Arc::new(InstanceEntry {
            id,
            document: Arc::clone(&document),
            sync_to_main: AtomicBool::new(sync_to_main),
            on_updated_data,
            errors: Notifier::new(),
            listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(self);
        let listener = document.listen(move |change| {
            if change.source != ChangeSource::User {
                return;
            }
            if let Some(group) = weak.upgrade() {
                group.forward_from_instance(id);
            }
        });
        *entry.listener.lock().unwrap() = Some(listener);

        self.instances
            .write()
            .unwrap()
            .insert(id, Arc::clone(&entry));
        log::debug!(
            "[StoreGroup] Attached instance {} to {} (sync_to_main: {})",
            id,
            self.shared_id().display(),
            sync_to_main
        );
        Ok(entry)
    }

    /// Hand the current payload to a freshly attached instance.
    pub(crate) fn announce(&self, entry: &InstanceEntry) {
        entry.updated_data(&self.last_persisted());
    }

    /// Detach an instance. Returns the number of instances left, or `None`
    /// if the instance was not attached.
    pub(crate) fn detach(&self, id: InstanceId) -> Option<usize> {
        let (entry, remaining) = {
            let mut instances = self.instances.write().unwrap();
            let entry = instances.shift_remove(&id)?;
            (entry, instances.len())
        };
        entry.listener.lock().unwrap().take();
        log::debug!(
            "[StoreGroup] Detached instance {} from {} ({} left)",
            id,
            self.shared_id().display(),
            remaining
        );
        Some(remaining)
    }

    /// Promote or demote an instance. Promotion pulls the main state into
    /// the instance before local edits start flowing upward.
    pub(crate) fn set_sync_to_main(&self, id: InstanceId, sync: bool) -> Result<()> {
        if self.is_disposed() {
            return Err(CanvasDocError::GroupDisposed(self.shared_id()));
        }
        let entry = self
            .instance(id)
            .ok_or_else(|| CanvasDocError::GroupDisposed(self.shared_id()))?;

        if sync && !entry.is_synchronizing_to_main() {
            entry
                .document
                .load_snapshot(&self.main.document.snapshot(), ChangeSource::Main);
        }
        entry.sync_to_main.store(sync, Ordering::SeqCst);
        Ok(())
    }

    /// Copy a promoted instance's state into the main store.
    fn forward_from_instance(&self, id: InstanceId) {
        if self.is_disposed() {
            return;
        }
        let Some(entry) = self.instance(id) else {
            return;
        };
        if !entry.is_synchronizing_to_main() {
            return;
        }
        log::debug!("[StoreGroup] Forwarding instance {} to main", id);
        self.main
            .document
            .load_snapshot(&entry.document.snapshot(), ChangeSource::Instance(id));
    }

    fn on_main_changed(&self, source: ChangeSource) {
        if self.is_disposed() {
            return;
        }
        let origin = match source {
            ChangeSource::User => None,
            ChangeSource::Instance(id) => Some(id),
            // Pushed state and resets were already applied to every replica.
            ChangeSource::Main | ChangeSource::External => return,
        };

        let snapshot = self.main.document.snapshot();
        for entry in self.instances_snapshot() {
            if Some(entry.id) != origin {
                entry.document.load_snapshot(&snapshot, ChangeSource::Main);
            }
        }
        self.persister.schedule();
    }

    /// Persistence action run by the debouncer.
    async fn persist(&self) -> Result<()> {
        let path = self.shared_id();
        let payload = {
            let previous = self.last_persisted();
            self.main
                .codec
                .encode(&previous, self.meta(), &self.main.document.snapshot())?
        };
        {
            let mut payloads = self.main.payloads.lock().unwrap();
            if payloads.last_persisted == payload {
                log::debug!("[StoreGroup] {} unchanged, skipping write", path.display());
                return Ok(());
            }
            payloads.in_flight = Some(payload.clone());
        }

        for entry in self.instances_snapshot() {
            entry.updated_data(&payload);
        }

        let result = self.host.write(&path, &payload).await;
        let mut payloads = self.main.payloads.lock().unwrap();
        payloads.in_flight = None;
        match result {
            Ok(()) => {
                log::debug!("[StoreGroup] Persisted {}", path.display());
                payloads.last_persisted = payload;
                Ok(())
            }
            Err(source) => Err(CanvasDocError::PersistenceFailed { path, source }),
        }
    }

    /// Deliver a persistence error to every attached handle.
    fn report_error(&self, error: CanvasDocError) {
        log::warn!("[StoreGroup] {}", error);
        for entry in self.instances_snapshot() {
            entry.errors.notify(&error);
        }
    }

    /// Reset every replica from a payload observed outside the engine.
    ///
    /// Returns `false` when the payload is the one last written or read, or
    /// the one being written right now.
    pub(crate) fn reconcile_external(&self, payload: String) -> Result<bool> {
        if self.is_disposed() {
            return Ok(false);
        }
        {
            let payloads = self.main.payloads.lock().unwrap();
            if payloads.last_persisted == payload
                || payloads.in_flight.as_deref() == Some(payload.as_str())
            {
                return Ok(false);
            }
        }

        let decoded = self.main.codec.decode(&payload)?;
        let instances = self.instances_snapshot();

        // Apply to every replica before anyone is notified.
        let main_changed = self.main.document.replace_quietly(&decoded.snapshot);
        let changed: Vec<bool> = instances
            .iter()
            .map(|entry| entry.document.replace_quietly(&decoded.snapshot))
            .collect();
        self.main.payloads.lock().unwrap().last_persisted = payload.clone();
        // The reset is authoritative; a queued save would overwrite it.
        self.persister.cancel();

        log::debug!(
            "[StoreGroup] Reset {} from external change ({} instances)",
            self.shared_id().display(),
            instances.len()
        );
        if main_changed {
            self.main.document.emit(ChangeSource::External);
        }
        for (entry, changed) in instances.iter().zip(changed) {
            if changed {
                entry.document.emit(ChangeSource::External);
            }
        }
        for entry in &instances {
            entry.updated_data(&payload);
        }
        Ok(true)
    }

    /// Adopt a payload written on the engine's behalf (asset embedding).
    pub(crate) fn propagate_payload(&self, payload: String) {
        if self.is_disposed() {
            return;
        }
        self.main.payloads.lock().unwrap().last_persisted = payload.clone();
        for entry in self.instances_snapshot() {
            entry.updated_data(&payload);
        }
    }

    /// Release subscriptions, the asset store and every instance. Returns
    /// `false` if the group was already shut down. The persister is left to
    /// the caller, which decides whether a pending save is flushed.
    pub(crate) fn shut_down(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.host_subscription.lock().unwrap().take();
        self.main_listener.lock().unwrap().take();
        if let Some(store) = self.asset_store.lock().unwrap().take() {
            store.dispose();
        }
        let instances: Vec<_> = self
            .instances
            .write()
            .unwrap()
            .drain(..)
            .map(|(_, entry)| entry)
            .collect();
        for entry in instances {
            entry.listener.lock().unwrap().take();
        }
        log::info!("[StoreGroup] Disposed {}", self.shared_id().display());
        true
    }
}

impl std::fmt::Debug for StoreGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGroup")
            .field("shared_id", &self.shared_id())
            .field("format", &self.main.format)
            .field("instances", &self.instance_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
