//! Wire types and error definitions for the remote authority boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Outcome of one gated invocation, as recorded in a usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    /// The wrapped operation ran and returned successfully.
    Success,
    /// The quota check denied the invocation; the operation never ran.
    Blocked,
    /// The wrapped operation ran and returned an error.
    Failed,
}

impl UsageOutcome {
    /// String form used on the wire and as a metrics label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UsageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fresh quota answer for one (customer, product) pair.
///
/// Never cached by the gateway; every invocation asks again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaDecision {
    /// Whether the caller may proceed.
    pub within_limits: bool,

    /// Remaining allowance after this check.
    pub remaining: i64,

    /// Plan the authority currently has the customer on.
    #[serde(default)]
    pub plan: String,

    /// Where to send the caller to upgrade, when the authority provides one.
    #[serde(default)]
    pub checkout_url: Option<String>,
}

/// One recorded invocation outcome. Write-once, fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Backend-stable customer reference the invocation was metered against.
    pub backend_ref: String,

    /// Product the quota check keyed on.
    pub product_id: String,

    /// Plan in effect at check time.
    pub plan_id: String,

    /// How the invocation ended.
    pub outcome: UsageOutcome,

    /// Name of the wrapped operation.
    pub action: String,

    /// Correlation ID minted per invocation.
    pub request_id: Uuid,

    /// Milliseconds from invocation entry to the recording point.
    pub duration_ms: u64,

    /// Unix epoch milliseconds at the recording point.
    pub timestamp_ms: u64,
}

/// Identity record as the authority returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// The authority's own stable reference for this customer.
    pub backend_ref: String,

    /// Email on file, if any.
    #[serde(default)]
    pub email: Option<String>,

    /// Display name on file, if any.
    #[serde(default)]
    pub name: Option<String>,

    /// External reference the record was linked to at creation, if any.
    #[serde(default)]
    pub external_ref: Option<String>,
}

/// Request body for identity creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdentityRequest {
    /// Email for the new identity (synthesized placeholder when the caller
    /// supplied no hint).
    pub email: String,

    /// Display name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// External reference to link for later lookup, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

/// Errors from remote authority calls.
///
/// All payloads are strings so values stay `Clone` and can be fanned out to
/// every waiter of a deduplicated request.
#[derive(Debug, Clone, Error)]
pub enum AuthorityError {
    /// Connection, timeout, or response-decoding failure.
    #[error("authority transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status outside the specially-mapped ones.
    #[error("authority returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The referenced identity or resource does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// The identity already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Client-side configuration problem (bad endpoint, client build).
    #[error("authority configuration error: {0}")]
    Config(String),
}

impl AuthorityError {
    /// True for the "identity not yet visible" class of failure: the record
    /// was just created and the usage/quota side has not indexed it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True when the identity already exists on the authority side.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True for failures worth retrying blindly: transport problems and
    /// server-side (5xx) statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for authority operations.
pub type AuthorityResult<T> = Result<T, AuthorityError>;
