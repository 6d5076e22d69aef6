//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for hosts that want the gateway's
//!   default setup
//! - Document the dedicated best-effort log target
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Initialization is opt-in: a library must never install a global
//!   subscriber on its own, so hosts call `init()` explicitly
//! - Log level configurable via `RUST_LOG`
//! - Swallowed recording failures log under `metering_gateway::best_effort`
//!   so hosts can route or silence them independently of real errors

use tracing_subscriber::EnvFilter;

/// Log target for failures that are deliberately swallowed (best-effort
/// usage recording). Filter on this target to route or mute them.
pub const BEST_EFFORT_TARGET: &str = "metering_gateway::best_effort";

/// Install a default tracing subscriber reading `RUST_LOG`, falling back to
/// `info`. Does nothing if a subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
