//! Request/response channel between a `LockClient` and the lock server.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LockError, Result};
use crate::manager::LockManager;
use crate::types::*;

/// Delivers lock and unlock requests to the server.
///
/// Implementations report server-side failures as [`LockError::Remote`] and
/// delivery problems as [`LockError::Transport`].
#[async_trait]
pub trait LockTransport: Send + Sync {
    async fn send_lock_requests(&self, message: LockRequestsMessage) -> Result<LockResponsesMessage>;

    async fn send_unlock_requests(&self, message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage>;
}

/// Talks to a `LockManager` in the same process.
#[derive(Clone)]
pub struct LocalTransport {
    manager: Arc<LockManager>,
}

impl LocalTransport {
    pub fn new(manager: Arc<LockManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl LockTransport for LocalTransport {
    async fn send_lock_requests(&self, message: LockRequestsMessage) -> Result<LockResponsesMessage> {
        let responses = self
            .manager
            .request_locks(&message.requests)
            .map_err(|e| LockError::Remote(e.to_string()))?;
        Ok(LockResponsesMessage { responses })
    }

    async fn send_unlock_requests(&self, message: UnlockRequestsMessage) -> Result<UnlockedObjectsMessage> {
        let unlocked = self.manager.unlock_objects(&message.requests);
        Ok(UnlockedObjectsMessage { unlocked })
    }
}

/// Bounds every round trip by the request timeout and checks that responses
/// mirror the requests they answer.
#[derive(Clone)]
pub(crate) struct RequestSender {
    transport: Arc<dyn LockTransport>,
    timeout: Duration,
}

impl RequestSender {
    pub(crate) fn new(transport: Arc<dyn LockTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub(crate) async fn lock(&self, requests: &[LockRequest]) -> Result<Vec<LockResponse>> {
        let message = LockRequestsMessage {
            requests: requests.to_vec(),
        };
        let reply = tokio::time::timeout(self.timeout, self.transport.send_lock_requests(message))
            .await
            .map_err(|_| LockError::RequestTimedOut(self.timeout))??;

        check_shape(requests, &reply.responses)?;
        Ok(reply.responses)
    }

    pub(crate) async fn lock_one(&self, request: &LockRequest) -> Result<LockResponse> {
        let mut responses = self.lock(std::slice::from_ref(request)).await?;
        responses
            .pop()
            .ok_or_else(|| LockError::UnexpectedResponse("empty response".to_string()))
    }

    pub(crate) async fn unlock(&self, requests: &[UnlockRequest]) -> Result<Vec<String>> {
        let message = UnlockRequestsMessage {
            requests: requests.to_vec(),
        };
        let reply = tokio::time::timeout(self.timeout, self.transport.send_unlock_requests(message))
            .await
            .map_err(|_| LockError::RequestTimedOut(self.timeout))??;
        Ok(reply.unlocked)
    }
}

/// One response per request, in order, each visiting the same ids in the same order.
fn check_shape(requests: &[LockRequest], responses: &[LockResponse]) -> Result<()> {
    if requests.len() != responses.len() {
        return Err(LockError::UnexpectedResponse(format!(
            "expected {} responses, got {}",
            requests.len(),
            responses.len()
        )));
    }

    for (request, response) in requests.iter().zip(responses) {
        if !request.object_ids().eq(response.object_ids()) {
            return Err(LockError::UnexpectedResponse(format!(
                "response for '{}' does not match its request",
                request.object_id
            )));
        }
    }
    Ok(())
}
