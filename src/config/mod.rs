//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml → loader.rs (read + parse)
//!              → validation.rs (semantic checks, all errors collected)
//!              → schema.rs types handed to Gateway::new / from_config
//! ```
//!
//! # Design Decisions
//! - Every field has a default; hosts override only what differs
//! - Validation runs before a gateway is constructed, never per call

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuthorityConfig, GatewayConfig, IdentityConfig, ResolutionCacheConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
