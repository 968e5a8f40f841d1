use crate::error::{LockError, Result};
use crate::infrastructure::LockTable;
use crate::types::{LockRequest, LockResponse, LockTree, LockedObjectRecord};
use std::collections::HashSet;

/// Decides whether a request tree is granted, all-or-nothing.
///
/// Pure with respect to everything but the table it is handed; the caller is
/// responsible for holding the table's lock across a whole `process` call.
pub struct LockRequestProcessor;

impl LockRequestProcessor {
    /// Rejects empty object ids and ids that appear twice in the tree.
    pub fn validate(request: &LockRequest) -> Result<()> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();

        for object_id in request.object_ids() {
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

    /// Evaluate and, if every node is free, commit the whole tree.
    pub fn process<T: LockTable + ?Sized>(
        table: &mut T,
        request: &LockRequest,
        default_auto_unlock_ms: u64,
        now: u64,
    ) -> Result<LockResponse> {
        Self::validate(request)?;

        // 1. Normalize lease lengths
        let request = Self::with_default_auto_unlock(request, default_auto_unlock_ms);

        // 2. Evaluate every node against the table (no side effects)
        let mut response = Self::evaluate(&*table, &request, now);

        // 3. All-or-nothing
        let granted = response.flatten().all(|node| node.is_available);

        // 4. Commit only a full grant
        if granted {
            Self::commit(table, &request, now);
        }
        Self::mark_granted(&mut response, granted);

        Ok(response)
    }

    /// Per-node availability, without deciding the grant. Every node comes back
    /// with `is_granted = false`.
    pub fn evaluate<T: LockTable + ?Sized>(table: &T, request: &LockRequest, now: u64) -> LockResponse {
        let linked = request
            .linked
            .iter()
            .map(|linked| Self::evaluate(table, linked, now))
            .collect();

        match table.get(&request.object_id) {
            Some(record) => LockResponse {
                object_id: request.object_id.clone(),
                holder: record.holder.clone(),
                is_available: false,
                is_granted: false,
                auto_unlock_at: Some(record.auto_unlock_at),
                linked,
            },
            None => LockResponse {
                object_id: request.object_id.clone(),
                holder: request.requester.clone(),
                is_available: true,
                is_granted: false,
                auto_unlock_at: request
                    .auto_unlock_ms
                    .map(|ms| now.saturating_add(ms)),
                linked,
            },
        }
    }

    fn with_default_auto_unlock(request: &LockRequest, default_auto_unlock_ms: u64) -> LockRequest {
        let mut request = request.clone();
        let mut stack = vec![&mut request];
        while let Some(node) = stack.pop() {
            node.auto_unlock_ms.get_or_insert(default_auto_unlock_ms);
            stack.extend(node.linked.iter_mut());
        }
        request
    }

    fn commit<T: LockTable + ?Sized>(table: &mut T, request: &LockRequest, now: u64) {
        for node in request.flatten() {
            let auto_unlock_ms = node.auto_unlock_ms.unwrap_or_default();
            table.insert(LockedObjectRecord::from_request(node, auto_unlock_ms, now));
        }
    }

    fn mark_granted(response: &mut LockResponse, granted: bool) {
        let mut stack = vec![response];
        while let Some(node) = stack.pop() {
            node.is_granted = granted;
            if !granted && node.is_available {
                // Nothing was locked, so there is no deadline to report.
                node.auto_unlock_at = None;
            }
            stack.extend(node.linked.iter_mut());
        }
    }
}
