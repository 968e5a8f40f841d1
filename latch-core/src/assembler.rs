use std::collections::HashMap;
use std::time::Duration;

use crate::error::{LockError, Result};
use crate::types::{LockInfo, LockObjectsResult, LockRequest, LockResponse, LockTree};

/// Turns final server responses into the caller-facing result.
///
/// Holder, grant and deadline come from the response; description and
/// priority from the caller's own request, matched by object id.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(
        requests: &[LockRequest],
        responses: &[LockResponse],
        total_waiting_time: Duration,
    ) -> Result<LockObjectsResult> {
        let requested: HashMap<&str, &LockRequest> = requests
            .iter()
            .flat_map(|request| request.flatten())
            .map(|node| (node.object_id.as_str(), node))
            .collect();

        let mut infos = HashMap::with_capacity(requested.len());
        for node in responses.iter().flat_map(|response| response.flatten()) {
            let request = requested.get(node.object_id.as_str()).ok_or_else(|| {
                LockError::UnexpectedResponse(format!(
                    "response for '{}' which was never requested",
                    node.object_id
                ))
            })?;

            infos.insert(
                node.object_id.clone(),
                LockInfo {
                    object_id: node.object_id.clone(),
                    description: request.description.clone(),
                    holder: node.holder.clone(),
                    is_granted: node.is_granted,
                    auto_unlock_at: node.auto_unlock_at,
                    priority: request.priority,
                },
            );
        }

        Ok(LockObjectsResult::new(infos, total_waiting_time))
    }
}
