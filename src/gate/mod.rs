//! Gating subsystem.
//!
//! # Data Flow
//! ```text
//! invoke(args):
//!     → identity::ensure_customer (cached, deduplicated)
//!     → authority::check_quota (always fresh)
//!     → within limits? run operation : raise GateError
//!     → dispatch usage event (detached, retried, failure swallowed)
//! ```
//!
//! # Design Decisions
//! - One error type (GateError) for blocked calls; everything else
//!   surfaces exactly as the operation or authority raised it
//! - Recording is observability, not authorization: it can never fail an
//!   invocation

pub mod pipeline;
pub mod types;

pub use pipeline::{Gateway, ProtectedOperation};
pub use types::{GateError, GateErrorKind, OperationMetadata, ProtectError};
