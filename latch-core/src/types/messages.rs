//! Message bodies exchanged with the lock server.

use serde::{Deserialize, Serialize};

use super::{LockRequest, LockResponse, UnlockRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequestsMessage {
    pub requests: Vec<LockRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponsesMessage {
    pub responses: Vec<LockResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequestsMessage {
    pub requests: Vec<UnlockRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockedObjectsMessage {
    pub unlocked: Vec<String>,
}

/// Sent by the server instead of a regular response when something went wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMessage {
    pub message: String,
}
