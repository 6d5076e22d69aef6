//! Identity resolution subsystem.
//!
//! # Data Flow
//! ```text
//! ensure_customer(identity):
//!     → fast paths (backend-native prefix, anonymous sentinel, mapping)
//!     → deduplicated flight: lookup by external ref
//!                          → create (once per key per process)
//!                          → conflict recovery or fallback
//!     → mapping updated with the resolved reference
//! ```
//!
//! # Design Decisions
//! - Degrades instead of failing: the gated operation always gets some
//!   reference to meter against
//! - Lookup-before-create plus conflict recovery keeps racing processes
//!   from minting duplicate backend identities

pub mod resolver;

pub use resolver::{CallerIdentity, IdentityResolver, ProfileHints};
