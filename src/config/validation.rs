//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the authority endpoint is an absolute http(s) URL
//! - Validate value ranges (timeouts > 0, sweep interval > 0)
//! - Detect conflicting identity settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig -> Result<(), Vec<ValidationError>>
//! - Runs before a gateway is built from the config

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("authority.base_url '{url}' is invalid: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("authority.timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("identity.backend_ref_prefix must not be empty")]
    EmptyBackendRefPrefix,

    #[error("identity.anonymous_ref must not be empty")]
    EmptyAnonymousRef,

    #[error("identity.anonymous_ref must not start with the backend prefix '{prefix}'")]
    AnonymousLooksBackendNative { prefix: String },

    #[error("resolution_cache.sweep_interval_secs must be greater than zero")]
    ZeroSweepInterval,

    #[error("recording_retry.initial_delay_ms must be greater than zero when retries are enabled")]
    ZeroRetryDelay,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.authority.base_url) {
        Ok(url) if url.scheme() != "http" && url.scheme() != "https" => {
            errors.push(ValidationError::InvalidBaseUrl {
                url: config.authority.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidBaseUrl {
            url: config.authority.base_url.clone(),
            reason: e.to_string(),
        }),
    }

    if config.authority.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.identity.backend_ref_prefix.is_empty() {
        errors.push(ValidationError::EmptyBackendRefPrefix);
    }
    if config.identity.anonymous_ref.is_empty() {
        errors.push(ValidationError::EmptyAnonymousRef);
    } else if !config.identity.backend_ref_prefix.is_empty()
        && config
            .identity
            .anonymous_ref
            .starts_with(&config.identity.backend_ref_prefix)
    {
        // The anonymous sentinel would take the backend-native fast path and
        // never be treated as anonymous.
        errors.push(ValidationError::AnonymousLooksBackendNative {
            prefix: config.identity.backend_ref_prefix.clone(),
        });
    }

    if config.resolution_cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }

    if config.recording_retry.max_retries > 0 && config.recording_retry.initial_delay_ms == 0 {
        errors.push(ValidationError::ZeroRetryDelay);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
