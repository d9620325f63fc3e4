//! Client-side control and monitoring for a remote video-detection service.
//!
//! The sync controller owns all client state; the TUI and headless modes
//! only send commands and render belief snapshots.

pub mod cli;
pub mod client;
pub mod logging;
pub mod model;
pub mod sync;
#[cfg(feature = "tui")]
pub mod tui;
