//! Views that load a shared document.
//!
//! [`Loadable`] is the capability every view kind shares: load a document
//! through the registry, unload it, and report whether it is loaded.
//! [`DocumentView`] implements it for editors (promoted instances) and
//! read-only renderers (mirrors).

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::document::DocumentStore;
use crate::error::{CanvasDocError, Result};
use crate::registry::{InstanceHandle, InstanceOptions, StoreRegistry};

/// How a view uses its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Local edits flow into the shared document.
    Editor,
    /// Mirrors the shared document; local changes stay local.
    ReadOnly,
}

/// A view that can load and unload a shared document.
pub trait Loadable {
    /// Whether the view edits or mirrors the document.
    fn mode(&self) -> ViewMode;

    /// Load the document at `path`.
    ///
    /// Resolves to `Ok(false)` when the user cancelled the legacy conflict
    /// prompt or the view was unloaded while it was open.
    fn load(
        &self,
        registry: &StoreRegistry,
        path: &Path,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Release the document. Pending conflict prompts end as "view unloaded".
    fn unload(&self);

    /// True while the view holds an attached instance.
    fn is_loaded(&self) -> bool;
}

/// A view over one shared document.
pub struct DocumentView {
    mode: ViewMode,
    unload: Mutex<CancellationToken>,
    handle: Mutex<Option<InstanceHandle>>,
    payload: Arc<Mutex<Option<String>>>,
}

impl DocumentView {
    /// An unloaded view.
    pub fn new(mode: ViewMode) -> Self {
        Self {
            mode,
            unload: Mutex::new(CancellationToken::new()),
            handle: Mutex::new(None),
            payload: Arc::new(Mutex::new(None)),
        }
    }

    /// Shorthand for [`ViewMode::Editor`].
    pub fn editor() -> Self {
        Self::new(ViewMode::Editor)
    }

    /// Shorthand for [`ViewMode::ReadOnly`].
    pub fn read_only() -> Self {
        Self::new(ViewMode::ReadOnly)
    }

    /// The view's replica, while loaded.
    pub fn store(&self) -> Option<Arc<DocumentStore>> {
        self.handle.lock().unwrap().as_ref().map(InstanceHandle::store)
    }

    /// Latest backing payload seen by the view.
    pub fn payload(&self) -> Option<String> {
        self.payload.lock().unwrap().clone()
    }

    /// Token for the next load, replacing one cancelled by an earlier unload.
    fn load_token(&self) -> CancellationToken {
        let mut unload = self.unload.lock().unwrap();
        if unload.is_cancelled() {
            *unload = CancellationToken::new();
        }
        unload.clone()
    }
}

impl Loadable for DocumentView {
    fn mode(&self) -> ViewMode {
        self.mode
    }

    async fn load(&self, registry: &StoreRegistry, path: &Path) -> Result<bool> {
        let payload = Arc::clone(&self.payload);
        let options = InstanceOptions::new()
            .sync_to_main(self.mode == ViewMode::Editor)
            .unload_token(self.load_token())
            .on_updated_data(move |data| {
                *payload.lock().unwrap() = Some(data.to_string());
            });

        match registry.register(path, options).await {
            Ok(handle) => {
                let previous = self.handle.lock().unwrap().replace(handle);
                drop(previous);
                Ok(true)
            }
            Err(CanvasDocError::ConflictResolutionViewUnloaded { .. }) => Ok(false),
            Err(e @ CanvasDocError::ConflictResolutionCancelled { .. }) => {
                log::warn!("[DocumentView] {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn unload(&self) {
        self.unload.lock().unwrap().cancel();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.unregister();
        }
        self.payload.lock().unwrap().take();
    }

    fn is_loaded(&self) -> bool {
        self.handle
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(InstanceHandle::is_attached)
    }
}

impl std::fmt::Debug for DocumentView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentView")
            .field("mode", &self.mode)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
