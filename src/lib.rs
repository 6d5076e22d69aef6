//! Embedded metering gateway.
//!
//! Wraps a host application's operations so that each call resolves a
//! stable customer identity against a remote authority, checks an
//! entitlement/quota, runs only if permitted, and records the outcome on
//! a best-effort basis.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────┐
//!                  │                METERING GATEWAY                 │
//!   invoke(args)   │  ┌──────────┐   ┌──────────┐   ┌────────────┐  │
//!   ───────────────┼─▶│   gate   │──▶│ identity │──▶│   cache    │  │
//!                  │  │ pipeline │   │ resolver │   │ (dedup/TTL)│  │
//!                  │  └────┬─────┘   └────┬─────┘   └────────────┘  │
//!                  │       │              │                          │
//!                  │       ▼              ▼                          │
//!                  │  ┌─────────────────────────┐   ┌────────────┐  │
//!                  │  │  authority (trait + HTTP │◀──│ resilience │  │
//!                  │  │  client): quota, usage,  │   │  (retry)   │  │
//!                  │  │  lookup, create          │   └────────────┘  │
//!                  │  └─────────────────────────┘                    │
//!                  │  ┌────────────────────────────────────────────┐ │
//!                  │  │  config        observability (log/metrics) │ │
//!                  │  └────────────────────────────────────────────┘ │
//!                  └────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use metering_gateway::{CallerIdentity, Gateway, GatewayConfig, OperationMetadata};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::from_config(GatewayConfig::default())?;
//!
//! let search = gateway.protect(
//!     OperationMetadata::new("search", "free"),
//!     |query: &String| CallerIdentity::new(query.split(':').next().unwrap_or("anonymous")),
//!     |query: String| async move { Ok::<_, std::io::Error>(format!("results for {query}")) },
//! );
//!
//! match search.invoke("u1:rust crates".to_string()).await {
//!     Ok(results) => println!("{results}"),
//!     Err(err) if err.is_blocked() => eprintln!("upgrade at {:?}", err.checkout_url()),
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```

// Core pipeline
pub mod cache;
pub mod gate;
pub mod identity;

// Collaborators
pub mod authority;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use authority::{
    AuthorityCapabilities, AuthorityError, HttpAuthority, QuotaDecision, RemoteAuthority,
    UsageEvent, UsageOutcome,
};
pub use cache::{KeyedCacheConfig, KeyedRequestCache};
pub use config::{ConfigError, GatewayConfig};
pub use gate::{GateError, GateErrorKind, Gateway, OperationMetadata, ProtectError, ProtectedOperation};
pub use identity::{CallerIdentity, IdentityResolver, ProfileHints};
pub use resilience::{with_retry, with_retry_if, BackoffStrategy, RetryPolicy};
