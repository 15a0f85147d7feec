//! Change notification
//!
//! A small subscribe/notify hub. Listeners are called synchronously on the
//! task that published the event, after the hub lock is released, so a
//! listener may subscribe or unsubscribe from inside its callback.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tenantgate_core::{ActorId, TenantId};

/// What changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A fetched snapshot replaced the entry
    Refreshed,
    /// A local mutation was applied ahead of the store confirming it
    Optimistic,
    /// A failed fetch installed a zero-permission snapshot
    Degraded,
    /// A persisted snapshot was loaded on cold start
    Restored,
    /// The entry was removed (logout)
    Purged,
    /// The actor switched to a different active tenant
    ActiveTenantChanged,
}

/// Notification payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    pub kind: ChangeKind,
    /// Snapshot version after the change (0 when the entry is gone)
    pub version: u64,
}

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Subscribe/notify registry
#[derive(Clone, Default)]
pub struct ChangeHub {
    inner: Arc<Mutex<Listeners>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays registered until the handle is dropped
    /// or [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> Subscription {
        let mut guard = self.inner.lock();
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.insert(id, Arc::new(listener));
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every listener, in subscription order
    pub fn publish(&self, event: &ChangeEvent) {
        let listeners: Vec<Listener> = self.inner.lock().entries.values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// Handle returned by [`ChangeHub::subscribe`]
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<Listeners>>,
}

impl Subscription {
    /// Detach the listener
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.lock().entries.remove(&self.id);
        }
    }
}
