//! Client-side registry of "tell me when this object is unlocked" waiters.
//!
//! One slot per object id, shared by every waiter on that id. A slot resolves
//! exactly once: `true` when the unlock event arrives, `false` when the last
//! waiter lets go first (or the listener shuts down). The event stream is only
//! open while at least one waiter is alive.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};

use crate::error::{LockError, Result};
use crate::events::EventSource;
use crate::listener::{Lifecycle, ListenerState};

struct Slot {
    generation: u64,
    refs: usize,
    outcome: watch::Sender<Option<bool>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<String, Slot>,
    /// Live `UnlockWaiter`s, resolved or not. The monitor stops at zero.
    waiters: usize,
}

struct Inner {
    source: Arc<dyn EventSource>,
    lifecycle: Lifecycle,
    registry: Mutex<Registry>,
    next_generation: AtomicU64,
}

/// Handle to the unlock registry. Clones share the same registry.
#[derive(Clone)]
pub struct UnlockListener {
    inner: Arc<Inner>,
}

/// One caller's interest in one object id. Dropping it unsubscribes.
pub struct UnlockWaiter {
    object_id: String,
    generation: u64,
    outcome: watch::Receiver<Option<bool>>,
    listener: Weak<Inner>,
}

impl UnlockWaiter {
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Completes with `true` once the object is reported unlocked, `false` if
    /// the subscription was torn down first.
    pub async fn unlocked(&mut self) -> bool {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome == Some(true),
            Err(_) => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

impl Drop for UnlockWaiter {
    fn drop(&mut self) {
        if let Some(inner) = self.listener.upgrade() {
            inner.release(&self.object_id, self.generation);
        }
    }
}

impl UnlockListener {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                lifecycle: Lifecycle::new("unlock"),
                registry: Mutex::new(Registry::default()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Register one waiter per id, then make sure the monitor is running.
    /// Once this returns, any unlock published afterwards is observed.
    pub async fn subscribe(&self, object_ids: &[String]) -> Result<Vec<UnlockWaiter>> {
        let waiters: Vec<UnlockWaiter> = {
            let mut registry = self.inner.registry.lock();
            let waiters = object_ids
                .iter()
                .map(|object_id| self.inner.register(&mut registry, object_id))
                .collect();
            waiters
        };

        if waiters.is_empty() {
            return Ok(waiters);
        }

        let source = self.inner.source.clone();
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .lifecycle
            .ensure_active(|| async move {
                let events = source.open_unlock_stream().await?;
                Ok::<_, LockError>(tokio::spawn(pump(events, weak)))
            })
            .await?;

        Ok(waiters)
    }

    /// Resolve every pending slot among `object_ids` as unlocked.
    pub fn report_unlocked(&self, object_ids: &[String]) {
        self.inner.report_unlocked(object_ids);
    }

    pub fn is_subscribed(&self, object_id: &str) -> bool {
        self.inner.registry.lock().slots.contains_key(object_id)
    }

    /// Ids with at least one unresolved waiter.
    pub fn pending_object_ids(&self) -> Vec<String> {
        self.inner.registry.lock().slots.keys().cloned().collect()
    }

    pub fn state(&self) -> ListenerState {
        self.inner.lifecycle.state()
    }

    /// How often the monitor has been started so far.
    pub fn monitor_starts(&self) -> usize {
        self.inner.lifecycle.starts()
    }

    pub fn monitor_stops(&self) -> usize {
        self.inner.lifecycle.stops()
    }

    /// Cancel every pending waiter and stop the monitor.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Inner {
    fn register(self: &Arc<Self>, registry: &mut Registry, object_id: &str) -> UnlockWaiter {
        registry.waiters += 1;

        let slot = registry
            .slots
            .entry(object_id.to_string())
            .or_insert_with(|| Slot {
                generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                refs: 0,
                outcome: watch::channel(None).0,
            });
        slot.refs += 1;

        UnlockWaiter {
            object_id: object_id.to_string(),
            generation: slot.generation,
            outcome: slot.outcome.subscribe(),
            listener: Arc::downgrade(self),
        }
    }

    fn release(&self, object_id: &str, generation: u64) {
        let mut registry = self.registry.lock();
        registry.waiters = registry.waiters.saturating_sub(1);

        // A resolved slot is already gone, or replaced by a newer generation.
        if let Some(slot) = registry.slots.get_mut(object_id) {
            if slot.generation == generation {
                slot.refs = slot.refs.saturating_sub(1);
                if slot.refs == 0 {
                    if let Some(slot) = registry.slots.remove(object_id) {
                        slot.outcome.send_replace(Some(false));
                    }
                }
            }
        }

        // Still under the registry lock, so a concurrent subscribe either kept
        // the count above zero or registers after the stop and restarts.
        if registry.waiters == 0 {
            self.lifecycle.stop();
        }
    }

    fn report_unlocked(&self, object_ids: &[String]) {
        let mut registry = self.registry.lock();
        for object_id in object_ids {
            if let Some(slot) = registry.slots.remove(object_id) {
                tracing::trace!(object_id = %object_id, waiters = slot.refs, "Unlock observed");
                slot.outcome.send_replace(Some(true));
            }
        }
    }

    /// Wake every pending waiter as if its object had been unlocked. Waiters
    /// re-request afterwards, so a spurious wake only costs a round trip.
    fn report_all_unlocked(&self) {
        let mut registry = self.registry.lock();
        for (_, slot) in registry.slots.drain() {
            slot.outcome.send_replace(Some(true));
        }
    }

    fn shutdown(&self) {
        let mut registry = self.registry.lock();
        for (_, slot) in registry.slots.drain() {
            slot.outcome.send_replace(Some(false));
        }
        self.lifecycle.stop();
    }
}

async fn pump(mut events: broadcast::Receiver<Vec<String>>, listener: Weak<Inner>) {
    loop {
        let received = events.recv().await;
        let Some(inner) = listener.upgrade() else {
            break;
        };

        match received {
            Ok(object_ids) => inner.report_unlocked(&object_ids),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Unlock stream lagged, waking all waiters");
                inner.report_all_unlocked();
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::warn!("Unlock stream closed, cancelling all waiters");
                inner.shutdown();
                break;
            }
        }
    }
}
