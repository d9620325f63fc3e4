//! Logging setup.
//!
//! Installs a global tracing subscriber writing to stderr. The TUI defaults
//! to errors only so raw-mode output stays clean; headless modes default to
//! info. `RUST_LOG` overrides either default.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

pub fn init(quiet: bool) {
    INIT.get_or_init(|| {
        let default = if quiet {
            "detectctl=error"
        } else {
            "detectctl=info"
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}
