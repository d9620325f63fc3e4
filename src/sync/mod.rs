//! Detection control synchronization.
//!
//! Owns the client-side belief about the remote detection job and keeps it
//! consistent with the service via control calls and adaptive status polling.
//! Presentation layers drive the controller with [`crate::model::SyncCommand`]s
//! and consume [`crate::model::SyncEvent`]s; they hold no state of their own.

mod belief;
mod controller;
mod poller;

pub use controller::run_controller;
