//! Start/stop lifecycle shared by the unlock and preemption listeners.
//!
//! A listener is `Idle` until its first subscriber arrives, `Transitioning`
//! while the underlying event stream is being opened, and `Active` while a pump
//! task forwards events. Concurrent starts collapse into one: whoever flips
//! `Idle -> Transitioning` opens the stream, everyone else waits for the outcome.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Transitioning,
    Active,
}

pub(crate) struct Lifecycle {
    name: &'static str,
    state: watch::Sender<ListenerState>,
    /// Guards the pump handle and every `Active <-> Idle` flip.
    pump: Mutex<Option<JoinHandle<()>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl Lifecycle {
    pub(crate) fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            name,
            state,
            pump: Mutex::new(None),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Returns once the listener is `Active`. `start` opens the stream and
    /// spawns the pump; it only runs if this call performs the transition.
    pub(crate) async fn ensure_active<F, Fut>(&self, start: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<JoinHandle<()>>>,
    {
        loop {
            let claimed = self.state.send_if_modified(|state| {
                if *state == ListenerState::Idle {
                    *state = ListenerState::Transitioning;
                    true
                } else {
                    false
                }
            });

            if claimed {
                return self.activate(start).await;
            }

            let mut observer = self.state.subscribe();
            let active = observer
                .wait_for(|state| *state != ListenerState::Transitioning)
                .await
                .map(|state| *state == ListenerState::Active)
                .unwrap_or(false);

            if active {
                return Ok(());
            }
            // Went back to Idle (failed start or a stop): try to claim it.
        }
    }

    async fn activate<F, Fut>(&self, start: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<JoinHandle<()>>>,
    {
        let mut transition = TransitionGuard {
            state: &self.state,
            armed: true,
        };

        match start().await {
            Ok(handle) => {
                transition.armed = false;
                let mut pump = self.pump.lock();
                *pump = Some(handle);
                self.state.send_replace(ListenerState::Active);
                self.starts.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(listener = self.name, "Monitor started");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(listener = self.name, error = %e, "Monitor failed to start");
                Err(e)
            }
        }
    }

    /// `Active -> Idle`. No-op in any other state. Returns true if it stopped.
    pub(crate) fn stop(&self) -> bool {
        let mut pump = self.pump.lock();
        let stopped = self.state.send_if_modified(|state| {
            if *state == ListenerState::Active {
                *state = ListenerState::Idle;
                true
            } else {
                false
            }
        });

        if stopped {
            if let Some(handle) = pump.take() {
                handle.abort();
            }
            self.stops.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(listener = self.name, "Monitor stopped");
        }
        stopped
    }
}

/// Puts a claimed transition back to `Idle` unless it completed, including when
/// the starting future is dropped halfway.
struct TransitionGuard<'a> {
    state: &'a watch::Sender<ListenerState>,
    armed: bool,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(ListenerState::Idle);
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.get_mut().take() {
            handle.abort();
        }
    }
}
