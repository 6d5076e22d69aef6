//! Request deduplication and caching subsystem.
//!
//! # Data Flow
//! ```text
//! resolve(key, producer):
//!     → store lookup (fresh entry? return it)
//!     → in-flight registry (flight running? join it)
//!     → become leader: spawn producer, settle into store, unregister
//! ```
//!
//! # Design Decisions
//! - One producer run per key no matter how many callers arrive
//! - The store and the registry have independent lifecycles; sweeps never
//!   touch a running flight

pub mod keyed;

pub use keyed::{KeyedCacheConfig, KeyedRequestCache};
