use serde::{Deserialize, Serialize};

use super::{LockRequest, Priority};

/// A granted lock, as stored in the lock table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedObjectRecord {
    pub object_id: String,
    pub description: String,
    /// Context info of the holder
    pub holder: String,
    pub priority: Priority,
    /// When the lock was acquired (ms since epoch)
    pub acquired_at: u64,
    /// When the lock will be released automatically (acquired_at + lease)
    pub auto_unlock_at: u64,
    /// Direct children locked together with this object
    pub linked_object_ids: Vec<String>,
}

impl LockedObjectRecord {
    /// Builds the record for one node of a granted request.
    pub fn from_request(request: &LockRequest, auto_unlock_ms: u64, now: u64) -> Self {
        Self {
            object_id: request.object_id.clone(),
            description: request.description.clone(),
            holder: request.requester.clone(),
            priority: request.priority,
            acquired_at: now,
            auto_unlock_at: now.saturating_add(auto_unlock_ms),
            linked_object_ids: request.linked.iter().map(|l| l.object_id.clone()).collect(),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.auto_unlock_at < now
    }
}
