//! Metrics collection.
//!
//! # Responsibilities
//! - Define gateway metrics (resolutions, gate decisions, recordings, cache)
//! - Keep metric names and label sets in one place
//!
//! # Metrics
//! - `gateway_invocations_total` (counter): gated invocations by outcome
//! - `gateway_identity_resolutions_total` (counter): resolutions by path taken
//! - `gateway_usage_recordings_total` (counter): recording dispatches by result
//! - `gateway_retries_total` (counter): retry sleeps by operation
//! - `gateway_cache_requests_total` (counter): keyed-cache lookups by result
//! - `gateway_cache_size` (gauge): current cached entries
//!
//! # Design Decisions
//! - Uses the `metrics` facade only; exporters belong to the host binary
//! - Low-overhead updates (atomic operations under the facade)
//! - Static label values so no per-call allocation

use metrics::{counter, gauge};

/// Record one gated invocation outcome ("success", "blocked", "failed").
pub fn record_gate_decision(outcome: &'static str) {
    counter!("gateway_invocations_total", "outcome" => outcome).increment(1);
}

/// Record which path an identity resolution took
/// ("backend_native", "anonymous", "mapped", "looked_up", "created", "fallback").
pub fn record_resolution(path: &'static str) {
    counter!("gateway_identity_resolutions_total", "path" => path).increment(1);
}

/// Record the final result of a usage-recording dispatch
/// ("recorded", "dropped").
pub fn record_usage_dispatch(result: &'static str) {
    counter!("gateway_usage_recordings_total", "result" => result).increment(1);
}

/// Record one retry sleep for the named operation.
pub fn record_retry(operation: &'static str) {
    counter!("gateway_retries_total", "operation" => operation).increment(1);
}

/// Record a keyed-cache lookup result ("hit", "miss", "joined").
pub fn record_cache_request(result: &'static str) {
    counter!("gateway_cache_requests_total", "result" => result).increment(1);
}

/// Record the current number of cached entries.
pub fn record_cache_size(size: usize) {
    gauge!("gateway_cache_size").set(size as f64);
}
