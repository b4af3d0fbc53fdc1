//! In-memory document replicas.
//!
//! A [`DocumentStore`] is one replica of a canvas document: an ordered map of
//! record ids to JSON records. State only moves between replicas as a
//! [`Snapshot`]. Every mutation is tagged with a [`ChangeSource`] so the
//! synchronization layer can tell a local edit from a propagated one.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::notifier::{Notifier, Subscription};

/// Identifier of one attached view (instance store). Never reused.
pub type InstanceId = u64;

/// Metadata carried by every decoded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DocumentMeta {
    /// Stable unique id of the document, independent of its path.
    pub uuid: String,
    /// Version of the application that last wrote the document.
    #[serde(default)]
    pub app_version: String,
}

impl DocumentMeta {
    /// Metadata for a brand-new document with a freshly generated uuid.
    pub fn generate(app_version: impl Into<String>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            app_version: app_version.into(),
        }
    }
}

/// Point-in-time copy of a replica's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Snapshot {
    /// Records keyed by record id.
    #[serde(default)]
    pub records: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Create a snapshot from `(id, record)` pairs.
    pub fn from_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            records: records.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where a change to a replica came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    /// An edit made directly on this replica.
    User,
    /// State pushed down from the main store.
    Main,
    /// State forwarded up from the given instance.
    Instance(InstanceId),
    /// A reconciliation reset from the backing document.
    External,
}

/// Notification emitted after a replica changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Origin of the change.
    pub source: ChangeSource,
}

/// One replica of a document.
///
/// # Example
///
/// ```ignore
/// use canvasdoc_core::document::{DocumentMeta, DocumentStore, Snapshot};
/// use serde_json::json;
///
/// let store = DocumentStore::new(DocumentMeta::generate("1.0.0"), Snapshot::default());
/// let _sub = store.listen(|change| println!("changed by {:?}", change.source));
/// store.put("shape:1", json!({ "type": "geo" }));
/// ```
pub struct DocumentStore {
    meta: DocumentMeta,
    records: RwLock<BTreeMap<String, Value>>,
    changes: Notifier<StoreChange>,
}

impl DocumentStore {
    /// Create a replica seeded from a snapshot.
    pub fn new(meta: DocumentMeta, snapshot: Snapshot) -> Self {
        Self {
            meta,
            records: RwLock::new(snapshot.records),
            changes: Notifier::new(),
        }
    }

    /// Document metadata.
    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// Insert or replace a record as a local edit.
    pub fn put(&self, id: impl Into<String>, record: Value) {
        let id = id.into();
        let changed = {
            let mut records = self.records.write().unwrap();
            if records.get(&id) == Some(&record) {
                false
            } else {
                records.insert(id, record);
                true
            }
        };
        if changed {
            self.emit(ChangeSource::User);
        }
    }

    /// Remove a record as a local edit. Returns the removed record.
    pub fn remove(&self, id: &str) -> Option<Value> {
        let removed = self.records.write().unwrap().remove(id);
        if removed.is_some() {
            self.emit(ChangeSource::User);
        }
        removed
    }

    /// Ids of every record, in order.
    pub fn record_ids(&self) -> Vec<String> {
        self.records.read().unwrap().keys().cloned().collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Whether the replica has no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Export the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records.read().unwrap().clone(),
        }
    }

    /// Replace the whole state with `snapshot` and notify listeners.
    ///
    /// Returns `false` (and notifies nobody) when the state was already equal.
    pub fn load_snapshot(&self, snapshot: &Snapshot, source: ChangeSource) -> bool {
        let changed = self.replace_quietly(snapshot);
        if changed {
            self.emit(source);
        }
        changed
    }

    /// Replace the state without notifying. Pair with [`DocumentStore::emit`]
    /// to apply one snapshot to several replicas before anyone observes it.
    pub(crate) fn replace_quietly(&self, snapshot: &Snapshot) -> bool {
        let mut records = self.records.write().unwrap();
        if *records == snapshot.records {
            return false;
        }
        *records = snapshot.records.clone();
        true
    }

    pub(crate) fn emit(&self, source: ChangeSource) {
        self.changes.notify(&StoreChange { source });
    }

    /// Listen for changes to this replica.
    pub fn listen<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.changes.add_listener(callback)
    }

    /// Whether two handles point at the same replica.
    pub fn same_replica(a: &Arc<DocumentStore>, b: &Arc<DocumentStore>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("uuid", &self.meta.uuid)
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn store() -> DocumentStore {
        DocumentStore::new(
            DocumentMeta {
                uuid: "doc-1".into(),
                app_version: "1.0.0".into(),
            },
            Snapshot::default(),
        )
    }

    #[test]
    fn test_put_and_remove_emit_user_changes() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = store.listen(move |change| seen_clone.lock().unwrap().push(change.source));

        store.put("shape:1", json!({ "x": 1 }));
        store.put("shape:1", json!({ "x": 1 }));
        assert_eq!(store.remove("shape:1"), Some(json!({ "x": 1 })));
        assert_eq!(store.remove("shape:1"), None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeSource::User, ChangeSource::User]
        );
    }

    #[test]
    fn test_load_snapshot_tags_source_and_skips_identical_state() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = store.listen(move |change| seen_clone.lock().unwrap().push(change.source));

        let snapshot = Snapshot::from_records([("shape:1", json!({ "x": 2 }))]);
        assert!(store.load_snapshot(&snapshot, ChangeSource::Main));
        assert!(!store.load_snapshot(&snapshot, ChangeSource::Main));

        assert_eq!(store.snapshot(), snapshot);
        assert_eq!(*seen.lock().unwrap(), vec![ChangeSource::Main]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = store();
        store.put("a", json!(1));
        let snapshot = store.snapshot();
        store.put("b", json!(2));
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(store.record_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_generated_meta_is_unique() {
        let a = DocumentMeta::generate("1.0.0");
        let b = DocumentMeta::generate("1.0.0");
        assert_ne!(a.uuid, b.uuid);
    }
}
