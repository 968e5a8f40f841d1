use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Priority;

/// A rooted tree of lock nodes keyed by object id.
pub trait LockTree: Sized {
    fn object_id(&self) -> &str;

    fn linked(&self) -> &[Self];

    /// Depth-first walk: the node itself, then each linked subtree in order.
    /// Iterative, so deep link chains don't grow the call stack.
    fn flatten(&self) -> Flatten<'_, Self> {
        Flatten { stack: vec![self] }
    }

    fn object_ids(&self) -> impl Iterator<Item = &str> {
        self.flatten().map(|node| node.object_id())
    }
}

/// Pre-order iterator over a [`LockTree`]. Call `flatten()` again to restart.
pub struct Flatten<'a, T> {
    stack: Vec<&'a T>,
}

impl<'a, T: LockTree> Iterator for Flatten<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.stack.pop()?;
        self.stack.extend(node.linked().iter().rev());
        Some(node)
    }
}

/// A request to lock an object together with its linked objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Id of the object to lock. Unique across the whole tree.
    pub object_id: String,
    #[serde(default)]
    pub description: String,
    /// Who is asking (context info). Becomes the holder info when granted.
    #[serde(default)]
    pub requester: String,
    #[serde(default)]
    pub priority: Priority,
    /// Lease length in milliseconds. `None` falls back to the table default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_unlock_ms: Option<u64>,
    /// Objects that must be locked together with this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked: Vec<LockRequest>,
}

impl LockRequest {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            description: String::new(),
            requester: String::new(),
            priority: Priority::default(),
            auto_unlock_ms: None,
            linked: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = requester.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_auto_unlock(mut self, after: Duration) -> Self {
        self.auto_unlock_ms = Some(after.as_millis() as u64);
        self
    }

    pub fn with_linked(mut self, linked: LockRequest) -> Self {
        self.linked.push(linked);
        self
    }
}

impl LockTree for LockRequest {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn linked(&self) -> &[Self] {
        &self.linked
    }
}

/// Outcome of evaluating one node of a [`LockRequest`] tree. Mirrors its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResponse {
    pub object_id: String,
    /// Current holder, or the requester when the object is free.
    pub holder: String,
    /// The object was unlocked at evaluation time.
    pub is_available: bool,
    /// The whole tree was granted by this call. Same value on every node.
    pub is_granted: bool,
    /// Holder's deadline if held, the new deadline if granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_unlock_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked: Vec<LockResponse>,
}

impl LockResponse {
    /// Ids of every node in this tree that is currently held by someone else.
    pub fn unavailable_ids(&self) -> Vec<String> {
        self.flatten()
            .filter(|node| !node.is_available)
            .map(|node| node.object_id.clone())
            .collect()
    }
}

impl LockTree for LockResponse {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn linked(&self) -> &[Self] {
        &self.linked
    }
}

/// A request to release one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub object_id: String,
    /// Also release every object that was locked as linked to this one.
    #[serde(default)]
    pub release_linked: bool,
}

impl UnlockRequest {
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            release_linked: false,
        }
    }

    pub fn with_linked(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            release_linked: true,
        }
    }
}
