use serde::Serialize;

use latch_core::processor::LockRequestProcessor;
use latch_core::types::{LockRequestsMessage, LockedObjectRecord, UnlockRequestsMessage};

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn validate_lock_requests(message: &LockRequestsMessage) -> Result<(), String> {
    for (i, request) in message.requests.iter().enumerate() {
        LockRequestProcessor::validate(request).map_err(|e| format!("requests[{}]: {}", i, e))?;
    }
    Ok(())
}

pub fn validate_unlock_requests(message: &UnlockRequestsMessage) -> Result<(), String> {
    for (i, request) in message.requests.iter().enumerate() {
        if request.object_id.trim().is_empty() {
            return Err(format!("requests[{}]: object_id is required", i));
        }
    }
    Ok(())
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub locked_objects: usize,
    pub version: String,
}

#[derive(Serialize)]
pub struct LockedObjectInfo {
    pub object_id: String,
    pub description: String,
    pub holder: String,
    pub priority: String,
    pub acquired_at: u64,
    pub auto_unlock_at: u64,
    pub linked_object_ids: Vec<String>,
}

impl From<LockedObjectRecord> for LockedObjectInfo {
    fn from(record: LockedObjectRecord) -> Self {
        Self {
            object_id: record.object_id,
            description: record.description,
            holder: record.holder,
            priority: record.priority.to_string(),
            acquired_at: record.acquired_at,
            auto_unlock_at: record.auto_unlock_at,
            linked_object_ids: record.linked_object_ids,
        }
    }
}

#[derive(Serialize)]
pub struct UnlockedResponse {
    pub unlocked: Vec<String>,
}
