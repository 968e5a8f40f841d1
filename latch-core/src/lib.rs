//! # latch-core
//!
//! Tree-shaped, all-or-nothing object locking. A lock request names an object
//! and the objects linked to it; either the whole tree is locked or nothing is.
//! Locks carry a lease and are released automatically once it runs out.
//!
//! Server side: [`manager::LockManager`] owns the lock table and announces
//! unlocks and incoming requests through [`events::EventHub`].
//! Client side: [`client::LockClient`] locks and unlocks through a
//! [`transport::LockTransport`], optionally waiting for blocked objects.

pub mod assembler;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
pub mod listener;
pub mod manager;
pub mod preemption;
pub mod processor;
pub mod reaper;
pub mod transport;
pub mod types;
pub mod unlock_listener;
mod wait;

pub use client::LockClient;
pub use error::{LockError, Result};
pub use manager::LockManager;

#[cfg(test)]
mod client_test;
