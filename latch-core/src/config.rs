use std::time::Duration;

/// Server-side settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Lease applied to request nodes that don't carry their own.
    pub default_auto_unlock: Duration,
    /// Buffer of each event channel. Slow listeners past this lag behind.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_auto_unlock: Duration::from_secs(60 * 60),
            event_capacity: 1024,
        }
    }
}

impl ManagerConfig {
    pub fn with_default_auto_unlock(mut self, lease: Duration) -> Self {
        self.default_auto_unlock = lease;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Client-side settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on a single request/response round trip.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
