//! Authoritative, thread-safe lock manager: the lock table plus the event hub
//! that announces what happens to it. The HTTP server and the in-process
//! transport both delegate to this.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::events::EventHub;
use crate::infrastructure::LockTable;
use crate::infrastructure_in_memory::InMemoryLockTable;
use crate::processor::LockRequestProcessor;
use crate::reaper::ExpiryReaper;
use crate::types::*;

pub struct LockManager {
    /// Single critical section for evaluate+commit and every unlock path
    table: Mutex<Box<dyn LockTable + Send>>,
    config: ManagerConfig,
    events: EventHub,
}

impl LockManager {
    /// Create a manager with an empty in-memory table and default settings.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self::with_table(InMemoryLockTable::new(), config)
    }

    pub fn with_table(table: impl LockTable + Send + 'static, config: ManagerConfig) -> Self {
        let events = EventHub::new(config.event_capacity);
        Self {
            table: Mutex::new(Box::new(table)),
            config,
            events,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    fn default_auto_unlock_ms(&self) -> u64 {
        self.config.default_auto_unlock.as_millis() as u64
    }

    /// Try to lock a request tree, all-or-nothing.
    pub fn request_lock(&self, request: &LockRequest) -> Result<LockResponse> {
        self.request_lock_at(request, now_ms())
    }

    pub fn request_lock_at(&self, request: &LockRequest, now: u64) -> Result<LockResponse> {
        LockRequestProcessor::validate(request)?;

        let mut table = self.table.lock();

        let expired = ExpiryReaper::unlock_expired(&mut **table, now);
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Expired locks released");
            self.events.publish_unlocked(&expired);
        }

        let response = LockRequestProcessor::process(
            &mut **table,
            request,
            self.default_auto_unlock_ms(),
            now,
        )?;
        self.events.publish_lock_request(request);

        if response.is_granted {
            tracing::debug!(
                object_id = %request.object_id,
                requester = %request.requester,
                "Lock granted"
            );
        } else {
            tracing::debug!(
                object_id = %request.object_id,
                requester = %request.requester,
                unavailable = ?response.unavailable_ids(),
                "Lock denied"
            );
        }

        Ok(response)
    }

    /// Process several independent trees. Every tree is validated before any is processed.
    pub fn request_locks(&self, requests: &[LockRequest]) -> Result<Vec<LockResponse>> {
        for request in requests {
            LockRequestProcessor::validate(request)?;
        }

        let now = now_ms();
        requests
            .iter()
            .map(|request| self.request_lock_at(request, now))
            .collect()
    }

    /// Release one object (and optionally everything linked to it). Returns the
    /// ids actually released.
    pub fn unlock_object(&self, object_id: &str, unlock_linked: bool) -> Vec<String> {
        let mut table = self.table.lock();
        let unlocked = ExpiryReaper::unlock_object(&mut **table, object_id, unlock_linked);
        self.announce_unlocked(&unlocked);
        unlocked
    }

    pub fn unlock_objects(&self, requests: &[UnlockRequest]) -> Vec<String> {
        requests
            .iter()
            .flat_map(|request| self.unlock_object(&request.object_id, request.release_linked))
            .collect()
    }

    pub fn unlock_all(&self) -> Vec<String> {
        let mut table = self.table.lock();
        let unlocked = ExpiryReaper::unlock_all(&mut **table);
        self.announce_unlocked(&unlocked);
        unlocked
    }

    pub fn unlock_expired(&self) -> Vec<String> {
        self.unlock_expired_at(now_ms())
    }

    pub fn unlock_expired_at(&self, now: u64) -> Vec<String> {
        let mut table = self.table.lock();
        let unlocked = ExpiryReaper::unlock_expired(&mut **table, now);
        self.announce_unlocked(&unlocked);
        unlocked
    }

    /// Snapshot of every held lock.
    pub fn locked_objects(&self) -> Vec<LockedObjectRecord> {
        self.table.lock().records()
    }

    pub fn is_locked(&self, object_id: &str) -> bool {
        self.table.lock().contains(object_id)
    }

    /// Periodically release expired locks. Requests already reap lazily, so this
    /// only bounds how long an expired lock stays visible. The task ends once
    /// the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let expired = manager.unlock_expired();
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "Expired locks released");
                }
            }
        })
    }

    fn announce_unlocked(&self, unlocked: &[String]) {
        if unlocked.is_empty() {
            return;
        }
        tracing::debug!(objects = ?unlocked, "Objects unlocked");
        self.events.publish_unlocked(unlocked);
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
