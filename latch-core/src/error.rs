//! Error types for latch.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using latch's error
pub type Result<T> = std::result::Result<T, LockError>;

/// Things that can go wrong while locking or unlocking.
///
/// Not getting a lock within the waiting time is *not* an error: it is reported
/// through the granted flags of the result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    // Caller misuse, rejected before anything is sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("The provided requests contain duplicate object ids: {}", .0.join(", "))]
    DuplicateObjectIds(Vec<String>),

    #[error("Max waiting time must be greater than zero (got {0:?})")]
    InvalidWaitTime(Duration),

    // Remote side
    #[error("Lock server reported a failure: {0}")]
    Remote(String),

    #[error("Unexpected response from lock server: {0}")]
    UnexpectedResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No response from lock server within {0:?}")]
    RequestTimedOut(Duration),

    // Notification plumbing
    #[error("Unable to open event stream: {0}")]
    EventSource(String),
}
