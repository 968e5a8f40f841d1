//! Push side of the lock server: which objects got unlocked, and which lock
//! requests came in.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::LockRequest;

/// Where listeners get their notifications from.
///
/// Opening a stream may take a while (a remote subscription has to be set up),
/// hence async. Events published before a stream is opened are not replayed.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Batches of object ids, one batch per unlock operation.
    async fn open_unlock_stream(&self) -> Result<broadcast::Receiver<Vec<String>>>;

    /// Every lock request tree received by the server.
    async fn open_lock_request_stream(&self) -> Result<broadcast::Receiver<LockRequest>>;
}

/// In-process event fan-out owned by a `LockManager`.
#[derive(Debug, Clone)]
pub struct EventHub {
    unlocks: broadcast::Sender<Vec<String>>,
    lock_requests: broadcast::Sender<LockRequest>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (unlocks, _) = broadcast::channel(capacity.max(1));
        let (lock_requests, _) = broadcast::channel(capacity.max(1));
        Self {
            unlocks,
            lock_requests,
        }
    }

    pub fn publish_unlocked(&self, object_ids: &[String]) {
        if object_ids.is_empty() {
            return;
        }
        // No receivers is fine: nobody is waiting.
        let _ = self.unlocks.send(object_ids.to_vec());
    }

    pub fn publish_lock_request(&self, request: &LockRequest) {
        let _ = self.lock_requests.send(request.clone());
    }

    pub fn unlock_receivers(&self) -> usize {
        self.unlocks.receiver_count()
    }

    pub fn lock_request_receivers(&self) -> usize {
        self.lock_requests.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSource for EventHub {
    async fn open_unlock_stream(&self) -> Result<broadcast::Receiver<Vec<String>>> {
        Ok(self.unlocks.subscribe())
    }

    async fn open_lock_request_stream(&self) -> Result<broadcast::Receiver<LockRequest>> {
        Ok(self.lock_requests.subscribe())
    }
}
