//! Remote authority boundary.
//!
//! # Data Flow
//! ```text
//! Gateway/Resolver → api.rs (RemoteAuthority trait, capability snapshot)
//!                  → client.rs (reqwest-backed HTTP implementation)
//!                  → types.rs (wire types, error taxonomy)
//! ```
//!
//! # Design Decisions
//! - The trait is object-safe and consumed as `Arc<dyn RemoteAuthority>`,
//!   so hosts and tests can inject their own backends
//! - Optional operations are advertised once via capabilities, not probed
//!   per call

pub mod api;
pub mod client;
pub mod types;

pub use api::{AuthorityCapabilities, RemoteAuthority};
pub use client::HttpAuthority;
pub use types::{
    AuthorityError, AuthorityResult, CreateIdentityRequest, CustomerRecord, QuotaDecision,
    UsageEvent, UsageOutcome,
};
