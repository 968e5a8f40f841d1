//! Watches incoming lock requests for objects the caller holds and reports the
//! ones that outrank the caller's priority.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use crate::error::{LockError, Result};
use crate::events::EventSource;
use crate::listener::{Lifecycle, ListenerState};
use crate::types::{LockRequest, LockTree, Priority};

/// Someone asked for an object we hold, with a higher priority than ours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HigherPriorityLockRequest {
    /// The node that matched a registered threshold
    pub object_id: String,
    pub priority: Priority,
    /// The whole tree as observed by the server
    pub request: LockRequest,
}

struct Inner {
    source: Arc<dyn EventSource>,
    lifecycle: Lifecycle,
    thresholds: Mutex<HashMap<String, BTreeSet<Priority>>>,
    notifications: broadcast::Sender<HigherPriorityLockRequest>,
}

#[derive(Clone)]
pub struct PreemptionListener {
    inner: Arc<Inner>,
}

impl PreemptionListener {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_capacity(source, 256)
    }

    pub fn with_capacity(source: Arc<dyn EventSource>, capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                source,
                lifecycle: Lifecycle::new("preemption"),
                thresholds: Mutex::new(HashMap::new()),
                notifications,
            }),
        }
    }

    /// Receive a notification for every observed request that outranks a
    /// registered threshold. Only notifications sent after this call arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<HigherPriorityLockRequest> {
        self.inner.notifications.subscribe()
    }

    /// Report requests for `object_id` whose priority is strictly higher than `priority`.
    pub async fn listen(&self, object_id: impl Into<String>, priority: Priority) -> Result<()> {
        self.listen_many([(object_id.into(), priority)]).await
    }

    pub async fn listen_many<I>(&self, thresholds: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Priority)>,
    {
        let thresholds: Vec<(String, Priority)> = thresholds.into_iter().collect();
        if thresholds.iter().any(|(object_id, _)| object_id.trim().is_empty()) {
            return Err(LockError::InvalidRequest(
                "object_id must not be empty".to_string(),
            ));
        }
        if thresholds.is_empty() {
            return Ok(());
        }

        {
            let mut registered = self.inner.thresholds.lock();
            for (object_id, priority) in thresholds {
                registered.entry(object_id).or_default().insert(priority);
            }
        }

        let source = self.inner.source.clone();
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .lifecycle
            .ensure_active(|| async move {
                let requests = source.open_lock_request_stream().await?;
                Ok::<_, LockError>(tokio::spawn(pump(requests, weak)))
            })
            .await?;

        // All thresholds may have been withdrawn while the stream was opening.
        let registered = self.inner.thresholds.lock();
        if registered.is_empty() {
            self.inner.lifecycle.stop();
        }
        Ok(())
    }

    pub fn stop_listening(&self, object_id: &str, priority: Priority) {
        self.stop_listening_many([(object_id, priority)]);
    }

    pub fn stop_listening_many<'a, I>(&self, thresholds: I)
    where
        I: IntoIterator<Item = (&'a str, Priority)>,
    {
        let mut registered = self.inner.thresholds.lock();
        for (object_id, priority) in thresholds {
            if let Some(priorities) = registered.get_mut(object_id) {
                priorities.remove(&priority);
                if priorities.is_empty() {
                    registered.remove(object_id);
                }
            }
        }

        if registered.is_empty() {
            self.inner.lifecycle.stop();
        }
    }

    /// Priorities registered for `object_id`, most urgent first.
    pub fn thresholds(&self, object_id: &str) -> Vec<Priority> {
        self.inner
            .thresholds
            .lock()
            .get(object_id)
            .map(|priorities| priorities.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Check one observed request against the registered thresholds.
    pub fn report_lock_request(&self, request: &LockRequest) {
        self.inner.report_lock_request(request);
    }

    pub fn state(&self) -> ListenerState {
        self.inner.lifecycle.state()
    }

    pub fn monitor_starts(&self) -> usize {
        self.inner.lifecycle.starts()
    }

    pub fn monitor_stops(&self) -> usize {
        self.inner.lifecycle.stops()
    }

    /// Forget every threshold and stop the monitor.
    pub fn shutdown(&self) {
        let mut registered = self.inner.thresholds.lock();
        registered.clear();
        self.inner.lifecycle.stop();
    }
}

impl Inner {
    fn report_lock_request(&self, request: &LockRequest) {
        let matched = {
            let thresholds = self.thresholds.lock();
            let matched = request.flatten().find(|node| {
                thresholds.get(&node.object_id).is_some_and(|priorities| {
                    priorities.iter().any(|threshold| node.priority.outranks(*threshold))
                })
            });
            matched
        };

        // One notification per observed tree, for its first matching node.
        if let Some(node) = matched {
            tracing::debug!(
                object_id = %node.object_id,
                priority = %node.priority,
                requester = %node.requester,
                "Higher priority lock request"
            );
            let _ = self.notifications.send(HigherPriorityLockRequest {
                object_id: node.object_id.clone(),
                priority: node.priority,
                request: request.clone(),
            });
        }
    }
}

async fn pump(mut requests: broadcast::Receiver<LockRequest>, listener: Weak<Inner>) {
    loop {
        let received = requests.recv().await;
        let Some(inner) = listener.upgrade() else {
            break;
        };

        match received {
            Ok(request) => inner.report_lock_request(&request),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Lock request stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::warn!("Lock request stream closed");
                inner.lifecycle.stop();
                break;
            }
        }
    }
}
