//! Lock-with-wait: keep re-requesting the trees that were not granted, each
//! time one of the objects blocking them is unlocked, until they are granted
//! or the waiting time runs out.

use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{LockError, Result};
use crate::transport::RequestSender;
use crate::types::{LockRequest, LockResponse, LockTree};
use crate::unlock_listener::{UnlockListener, UnlockWaiter};

pub(crate) struct WaitCoordinator {
    sender: RequestSender,
    unlocks: UnlockListener,
}

impl WaitCoordinator {
    pub(crate) fn new(sender: RequestSender, unlocks: UnlockListener) -> Self {
        Self { sender, unlocks }
    }

    /// Returns the latest response for every request (in request order) and
    /// the time spent waiting. Trees still blocked at the deadline come back
    /// not granted; that is not an error.
    pub(crate) async fn lock_with_wait(
        &self,
        requests: &[LockRequest],
        max_wait: Duration,
    ) -> Result<(Vec<LockResponse>, Duration)> {
        if max_wait.is_zero() {
            return Err(LockError::InvalidWaitTime(max_wait));
        }

        let mut responses = self.sender.lock(requests).await?;
        let blocked: Vec<usize> = responses
            .iter()
            .enumerate()
            .filter(|(_, response)| !response.is_granted)
            .map(|(index, _)| index)
            .collect();

        if blocked.is_empty() {
            return Ok((responses, Duration::ZERO));
        }

        let started = Instant::now();
        let deadline = started + max_wait;

        let mut rounds = JoinSet::new();
        for index in blocked {
            let sender = self.sender.clone();
            let unlocks = self.unlocks.clone();
            let request = requests[index].clone();
            rounds.spawn(async move {
                let outcome = wait_for_tree(&sender, &unlocks, &request, deadline).await;
                (index, outcome)
            });
        }

        let mut failure = None;
        while let Some(joined) = rounds.join_next().await {
            match joined {
                Ok((index, Ok(Some(response)))) => responses[index] = response,
                Ok((_, Ok(None))) => {}
                Ok((_, Err(e))) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Wait task failed");
                    failure.get_or_insert(LockError::Transport(format!("wait task failed: {}", e)));
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        // Every step of every round is bounded by the deadline; only timer
        // granularity can push the measurement past it.
        let waited = started.elapsed().min(max_wait);
        tracing::debug!(waited_ms = waited.as_millis() as u64, "Finished waiting for locks");
        Ok((responses, waited))
    }
}

/// Re-request one tree until granted or out of time. Returns the last response
/// received, or `None` if the deadline passed before any re-request.
///
/// Every round arms waiters for all ids of the tree *before* sending, so an
/// unlock that lands between the server's answer and the next wait is not lost.
/// Opening the subscription, the re-send and the wait itself all end at
/// `deadline`; running out there means not granted.
async fn wait_for_tree(
    sender: &RequestSender,
    unlocks: &UnlockListener,
    request: &LockRequest,
    deadline: Instant,
) -> Result<Option<LockResponse>> {
    let object_ids: Vec<String> = request.object_ids().map(str::to_string).collect();
    let mut latest = None;
    // Kept across rounds so the monitor isn't stopped and restarted in between
    let mut blocking: Vec<UnlockWaiter>;

    loop {
        if Instant::now() >= deadline {
            return Ok(latest);
        }

        let Ok(armed) = tokio::time::timeout_at(deadline, unlocks.subscribe(&object_ids)).await
        else {
            tracing::debug!(object_id = %request.object_id, "Out of time opening unlock subscription");
            return Ok(latest);
        };
        let armed = armed?;

        let Ok(response) = tokio::time::timeout_at(deadline, sender.lock_one(request)).await else {
            tracing::debug!(object_id = %request.object_id, "Out of time re-sending lock request");
            return Ok(latest);
        };
        let response = response?;
        if response.is_granted {
            return Ok(Some(response));
        }

        let unavailable: HashSet<String> = response.unavailable_ids().into_iter().collect();
        tracing::debug!(
            object_id = %request.object_id,
            blocked_by = ?unavailable,
            "Waiting for unlock"
        );
        blocking = armed
            .into_iter()
            .filter(|waiter| unavailable.contains(waiter.object_id()))
            .collect();
        latest = Some(response);

        let unlocked = tokio::time::timeout_at(deadline, all_unlocked(&mut blocking))
            .await
            .unwrap_or(false);
        if !unlocked {
            return Ok(latest);
        }
    }
}

async fn all_unlocked(waiters: &mut [UnlockWaiter]) -> bool {
    for waiter in waiters.iter_mut() {
        if !waiter.unlocked().await {
            return false;
        }
    }
    true
}
