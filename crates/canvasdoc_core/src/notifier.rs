//! Listener registry used by every component that exposes change notification.
//!
//! [`Notifier`] keeps callbacks in subscription order. A notification pass
//! works on a snapshot of the listener list taken before the first callback
//! runs, so listeners added or removed from inside a callback only affect
//! later passes. A panicking callback does not stop the others and does not
//! reach the caller of [`Notifier::notify`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback invoked with a reference to the notified value.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Inner<E> {
    listeners: RwLock<IndexMap<SubscriptionId, Listener<E>>>,
    next_id: AtomicU64,
}

/// Ordered, thread-safe set of listeners.
///
/// # Example
///
/// ```ignore
/// use canvasdoc_core::notifier::Notifier;
///
/// let notifier: Notifier = Notifier::new();
/// let subscription = notifier.add_listener(|_| println!("changed"));
/// notifier.notify(&());
/// subscription.unsubscribe();
/// ```
pub struct Notifier<E = ()> {
    inner: Arc<Inner<E>>,
}

impl<E> Notifier<E> {
    /// Create a new notifier with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: RwLock::new(IndexMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Add a listener. Dropping the returned [`Subscription`] removes it.
    pub fn add_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .write()
            .unwrap()
            .insert(id, Arc::new(callback));

        let weak: Weak<Inner<E>> = Arc::downgrade(&self.inner);
        Subscription::new(id, move |id| {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.write().unwrap().shift_remove(&id);
            }
        })
    }

    /// Invoke every listener registered before this call, in subscription order.
    pub fn notify(&self, value: &E) {
        let listeners: Vec<Listener<E>> =
            self.inner.listeners.read().unwrap().values().cloned().collect();

        for listener in listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(value);
            }));
            if outcome.is_err() {
                log::warn!("[Notifier] Listener panicked; continuing with remaining listeners");
            }
        }
    }

    /// Get the number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().unwrap().len()
    }

    /// Check if there are any active listeners.
    pub fn has_listeners(&self) -> bool {
        !self.inner.listeners.read().unwrap().is_empty()
    }

    /// Remove all listeners.
    pub fn clear(&self) {
        self.inner.listeners.write().unwrap().clear();
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listener_count", &self.listener_count())
            .field("next_id", &self.inner.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

/// Handle to a registered listener.
///
/// The listener stays registered until [`Subscription::unsubscribe`] is called
/// or the handle is dropped. Unsubscribing twice is a no-op.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: SubscriptionId,
    remove: Option<Box<dyn FnOnce(SubscriptionId) + Send + Sync>>,
}

impl Subscription {
    /// Wrap a listener registered elsewhere; `remove` runs once on release.
    pub fn new(
        id: SubscriptionId,
        remove: impl FnOnce(SubscriptionId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            remove: Some(Box::new(remove)),
        }
    }

    /// Identifier of the listener behind this handle.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.remove.is_some())
            .finish()
    }
}
