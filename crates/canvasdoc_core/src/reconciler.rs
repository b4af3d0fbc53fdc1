//! Reacts to host events about a group's backing document.
//!
//! - `Modified` and `QuickPreview` reset the group from the new payload
//!   (reading it first when the event does not carry it)
//! - `Renamed` re-keys the group in the registry
//! - `Deleted` disposes the group

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use crate::group::StoreGroup;
use crate::host::HostEvent;
use crate::notifier::Subscription;
use crate::registry::RegistryInner;

/// Subscribe `group` to host events about its document.
pub(crate) fn install(group: &Arc<StoreGroup>, registry: Weak<RegistryInner>) -> Subscription {
    let weak_group = Arc::downgrade(group);
    group.host().subscribe(Arc::new(move |event: &HostEvent| {
        let Some(group) = weak_group.upgrade() else {
            return;
        };
        if group.is_disposed() || !group.is_shared_id(event.path()) {
            return;
        }
        handle(&group, &registry, event);
    }))
}

fn handle(group: &Arc<StoreGroup>, registry: &Weak<RegistryInner>, event: &HostEvent) {
    match event {
        HostEvent::Modified {
            payload: Some(payload),
            ..
        }
        | HostEvent::QuickPreview { payload, .. } => reconcile(group, payload.clone()),
        HostEvent::Modified { path, payload: None } => read_and_reconcile(group, path.clone()),
        HostEvent::Renamed { old_path, new_path } => {
            log::info!(
                "[Reconciler] {} renamed to {}",
                old_path.display(),
                new_path.display()
            );
            group.set_shared_id(new_path.clone());
            if let Some(registry) = registry.upgrade() {
                registry.refresh_shared_id(old_path);
            }
        }
        HostEvent::Deleted { path } => {
            log::info!("[Reconciler] {} deleted", path.display());
            if let Some(registry) = registry.upgrade() {
                registry.dispose_group(path);
            } else {
                group.shut_down();
                group.persister.dispose();
            }
        }
    }
}

fn reconcile(group: &StoreGroup, payload: String) {
    if let Err(e) = group.reconcile_external(payload) {
        log::warn!(
            "[Reconciler] Ignoring unreadable change to {}: {}",
            group.shared_id().display(),
            e
        );
    }
}

fn read_and_reconcile(group: &Arc<StoreGroup>, path: PathBuf) {
    let group = Arc::clone(group);
    let runtime = group.runtime().clone();
    runtime.spawn(async move {
        if group.is_disposed() {
            return;
        }
        match group.host().read(&path).await {
            // The document may have been renamed while reading.
            Ok(payload) if group.is_shared_id(&path) => reconcile(&group, payload),
            Ok(_) => {}
            Err(e) => log::warn!("[Reconciler] Failed to read {}: {}", path.display(), e),
        }
    });
}
