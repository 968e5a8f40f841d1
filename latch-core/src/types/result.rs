use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::Priority;

/// Caller-facing lock state of one requested object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub object_id: String,
    /// Description as supplied by the caller
    pub description: String,
    /// Current holder (the caller itself when granted)
    pub holder: String,
    pub is_granted: bool,
    pub auto_unlock_at: Option<u64>,
    /// Priority as supplied by the caller
    pub priority: Priority,
}

/// Result of one `lock_object(s)` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockObjectsResult {
    pub infos: HashMap<String, LockInfo>,
    /// Time spent waiting for unlocks over the whole call. Zero if granted immediately.
    pub total_waiting_time: Duration,
}

impl LockObjectsResult {
    pub fn new(infos: HashMap<String, LockInfo>, total_waiting_time: Duration) -> Self {
        Self {
            infos,
            total_waiting_time,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, object_id: &str) -> Option<&LockInfo> {
        self.infos.get(object_id)
    }

    pub fn is_granted(&self, object_id: &str) -> bool {
        self.infos.get(object_id).is_some_and(|info| info.is_granted)
    }

    /// True when every requested object was granted (vacuously true when empty).
    pub fn all_granted(&self) -> bool {
        self.infos.values().all(|info| info.is_granted)
    }
}
