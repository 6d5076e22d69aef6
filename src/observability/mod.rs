//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges via the metrics facade)
//!
//! Consumers:
//!     → Host's subscriber (stdout, file, remote)
//!     → Host's metrics exporter (Prometheus scrape or push)
//! ```
//!
//! # Design Decisions
//! - The gateway emits through facades only; sinks belong to the host
//! - Best-effort failures use a dedicated log target so they never pollute
//!   the host's error stream
//! - Metrics are cheap (atomic increments, static labels)

pub mod logging;
pub mod metrics;
