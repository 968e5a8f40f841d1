//! # LockClient
//!
//! Caller-facing entry point: lock and unlock object trees, optionally waiting
//! for blocked objects to be released, and get told when somebody with a higher
//! priority wants an object we hold.
//!
//! ```ignore
//! let manager = Arc::new(LockManager::new());
//! let client = LockClient::local(manager);
//!
//! let request = LockRequest::new("order-42")
//!     .with_requester("billing")
//!     .with_linked(LockRequest::new("customer-7"));
//!
//! let result = client
//!     .lock_object(request, Some(Duration::from_secs(10)))
//!     .await?;
//! assert!(result.all_granted());
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::assembler::ResultAssembler;
use crate::config::ClientConfig;
use crate::error::{LockError, Result};
use crate::events::EventSource;
use crate::manager::LockManager;
use crate::preemption::{HigherPriorityLockRequest, PreemptionListener};
use crate::transport::{LocalTransport, LockTransport, RequestSender};
use crate::types::*;
use crate::unlock_listener::UnlockListener;
use crate::wait::WaitCoordinator;

pub struct LockClient {
    sender: RequestSender,
    unlocks: UnlockListener,
    preemption: PreemptionListener,
    config: ClientConfig,
    /// Identifies this client in logs
    client_id: String,
}

impl LockClient {
    pub fn new(transport: Arc<dyn LockTransport>, events: Arc<dyn EventSource>) -> Self {
        Self::with_config(transport, events, ClientConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn LockTransport>,
        events: Arc<dyn EventSource>,
        config: ClientConfig,
    ) -> Self {
        let client_id = format!("client_{}", nanoid::nanoid!(10));
        tracing::debug!(client_id = %client_id, "Lock client created");
        Self {
            sender: RequestSender::new(transport, config.request_timeout),
            unlocks: UnlockListener::new(events.clone()),
            preemption: PreemptionListener::new(events),
            config,
            client_id,
        }
    }

    /// Client talking to a manager in the same process.
    pub fn local(manager: Arc<LockManager>) -> Self {
        let events: Arc<dyn EventSource> = Arc::new(manager.events().clone());
        Self::new(Arc::new(LocalTransport::new(manager)), events)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn unlock_listener(&self) -> &UnlockListener {
        &self.unlocks
    }

    pub fn preemption_listener(&self) -> &PreemptionListener {
        &self.preemption
    }

    // ─── Locking ────────────────────────────────────────────────────────────

    /// Lock one tree. With `max_wait`, keep trying until it is granted or the
    /// time is up; without it, ask once.
    pub async fn lock_object(
        &self,
        request: LockRequest,
        max_wait: Option<Duration>,
    ) -> Result<LockObjectsResult> {
        self.lock_objects(vec![request], max_wait).await
    }

    /// Lock several independent trees. Each tree is granted or refused on its
    /// own; nodes within one tree are all-or-nothing.
    pub async fn lock_objects(
        &self,
        requests: Vec<LockRequest>,
        max_wait: Option<Duration>,
    ) -> Result<LockObjectsResult> {
        Self::validate(&requests, max_wait)?;
        if requests.is_empty() {
            return Ok(LockObjectsResult::empty());
        }

        tracing::debug!(
            client_id = %self.client_id,
            trees = requests.len(),
            max_wait_ms = max_wait.map(|wait| wait.as_millis() as u64),
            "Requesting locks"
        );

        let (responses, waited) = match max_wait {
            Some(max_wait) => {
                WaitCoordinator::new(self.sender.clone(), self.unlocks.clone())
                    .lock_with_wait(&requests, max_wait)
                    .await?
            }
            None => (self.sender.lock(&requests).await?, Duration::ZERO),
        };

        ResultAssembler::assemble(&requests, &responses, waited)
    }

    fn validate(requests: &[LockRequest], max_wait: Option<Duration>) -> Result<()> {
        if let Some(wait) = max_wait {
            if wait.is_zero() {
                return Err(LockError::InvalidWaitTime(wait));
            }
        }

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for object_id in requests.iter().flat_map(|request| request.object_ids()) {
            if object_id.trim().is_empty() {
                return Err(LockError::InvalidRequest(
                    "object_id must not be empty".to_string(),
                ));
            }
            if !seen.insert(object_id) && !duplicates.iter().any(|d| d == object_id) {
                duplicates.push(object_id.to_string());
            }
        }

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(LockError::DuplicateObjectIds(duplicates))
        }
    }

    // ─── Unlocking ──────────────────────────────────────────────────────────

    /// Returns the ids the server actually released.
    pub async fn unlock_object(&self, request: UnlockRequest) -> Result<Vec<String>> {
        self.unlock_objects(vec![request]).await
    }

    pub async fn unlock_objects(&self, requests: Vec<UnlockRequest>) -> Result<Vec<String>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        if requests.iter().any(|request| request.object_id.trim().is_empty()) {
            return Err(LockError::InvalidRequest(
                "object_id must not be empty".to_string(),
            ));
        }

        let unlocked = self.sender.unlock(&requests).await?;
        tracing::debug!(client_id = %self.client_id, objects = ?unlocked, "Unlocked");
        Ok(unlocked)
    }

    // ─── Preemption ─────────────────────────────────────────────────────────

    /// Report lock requests for `object_id` that outrank `priority`.
    pub async fn listen_for_higher_priority(
        &self,
        object_id: impl Into<String>,
        priority: Priority,
    ) -> Result<()> {
        self.preemption.listen(object_id, priority).await
    }

    pub fn stop_listening_for_higher_priority(&self, object_id: &str, priority: Priority) {
        self.preemption.stop_listening(object_id, priority);
    }

    pub fn higher_priority_requests(&self) -> broadcast::Receiver<HigherPriorityLockRequest> {
        self.preemption.subscribe()
    }

    /// Cancel all pending waits and stop both monitors.
    pub fn shutdown(&self) {
        tracing::debug!(client_id = %self.client_id, "Lock client shutting down");
        self.unlocks.shutdown();
        self.preemption.shutdown();
    }
}
