//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a host can start from `GatewayConfig::default()`
//! and override only what it needs.

use serde::{Deserialize, Serialize};

use crate::resilience::retry::BackoffStrategy;

/// Root configuration for the metering gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Remote authority endpoint settings.
    pub authority: AuthorityConfig,

    /// Identity resolution settings.
    pub identity: IdentityConfig,

    /// Resolution flight cache settings.
    pub resolution_cache: ResolutionCacheConfig,

    /// Retry policy for best-effort usage recording.
    pub recording_retry: RetryConfig,
}

/// Remote authority endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base URL of the authority API (e.g., "https://api.example.com").
    pub base_url: String,

    /// Bearer token sent with every request. Empty disables auth.
    pub api_key: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Identity resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// References starting with this prefix are already backend-native and
    /// skip resolution entirely.
    pub backend_ref_prefix: String,

    /// Sentinel reference for anonymous callers; passed through unresolved.
    pub anonymous_ref: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            backend_ref_prefix: "cus_".to_string(),
            anonymous_ref: "anonymous".to_string(),
        }
    }
}

/// Settings for the keyed cache that coordinates resolution flights.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionCacheConfig {
    /// Seconds a resolved reference stays cached. Zero disables the cache
    /// (every call still deduplicates against in-flight resolutions).
    pub ttl_secs: u64,

    /// Maximum cached entries; oldest are evicted first. Zero = unbounded.
    pub max_entries: usize,

    /// Seconds between background sweeps of expired entries.
    pub sweep_interval_secs: u64,

    /// Whether failed resolutions are cached for the TTL. Off by default so
    /// the next caller retries.
    pub cache_failures: bool,
}

impl Default for ResolutionCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            max_entries: 1024,
            sweep_interval_secs: 60,
            cache_failures: false,
        }
    }
}

/// Retry policy configuration (used for usage recording).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Backoff curve: "fixed", "linear", or "exponential".
    pub backoff: BackoffStrategy,

    /// Cap on any single delay, in milliseconds. Absent = uncapped.
    pub max_delay_ms: Option<u64>,

    /// Add 0-10% random spread to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 250,
            backoff: BackoffStrategy::Exponential,
            max_delay_ms: Some(5_000),
            jitter: false,
        }
    }
}
