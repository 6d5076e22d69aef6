//! Gate-facing types and error definitions.

use serde::{Deserialize, Serialize};

use crate::authority::types::{AuthorityError, QuotaDecision};

/// Describes the operation being gated, for quota keying and usage events.
#[derive(Debug, Clone)]
pub struct OperationMetadata {
    /// Product the quota check keys on.
    pub product_id: String,

    /// Plan to attribute usage to when the quota decision carries none.
    pub plan_id: String,

    /// Operation name recorded in usage events.
    pub action: String,
}

impl OperationMetadata {
    /// Metadata with the action defaulting to the product identifier.
    pub fn new(product_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        let product_id = product_id.into();
        Self {
            action: product_id.clone(),
            product_id,
            plan_id: plan_id.into(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }
}

/// Why a blocked call was blocked. Only one kind exists today; the tag is
/// serialized so hosts can branch on it without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateErrorKind {
    PaymentRequired,
}

/// The single user-facing error a blocked invocation surfaces.
///
/// Always the direct result of a quota decision, never of an internal
/// fault. The shape is stable and serde-serializable so adapters can
/// return it on the wire as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateError {
    pub kind: GateErrorKind,

    /// Where the caller can upgrade, when the authority provided one.
    pub checkout_url: Option<String>,

    /// Human-readable explanation of the block.
    pub message: String,

    /// Product the quota decision was made for.
    pub product_id: String,
}

impl GateError {
    /// Build the error from a blocking quota decision.
    pub fn payment_required(decision: &QuotaDecision, product_id: &str) -> Self {
        let message = match &decision.checkout_url {
            Some(url) => format!(
                "Quota exceeded for '{}' ({} remaining). Upgrade at {}",
                product_id, decision.remaining, url
            ),
            None => format!(
                "Quota exceeded for '{}' ({} remaining)",
                product_id, decision.remaining
            ),
        };
        Self {
            kind: GateErrorKind::PaymentRequired,
            checkout_url: decision.checkout_url.clone(),
            message,
            product_id: product_id.to_string(),
        }
    }
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GateError {}

/// Everything a protected invocation can raise.
#[derive(Debug)]
pub enum ProtectError<E> {
    /// The quota decision denied the call; the operation never ran.
    Blocked(GateError),

    /// Identity resolution or the quota check failed upstream. Propagated
    /// unchanged: masking it would let unmetered calls through or block
    /// valid ones.
    Authority(AuthorityError),

    /// The wrapped operation itself failed; its error is passed through
    /// unmodified.
    Operation(E),
}

impl<E> ProtectError<E> {
    /// The checkout URL carried by a blocked invocation, if any.
    pub fn checkout_url(&self) -> Option<&str> {
        match self {
            Self::Blocked(gate) => gate.checkout_url.as_deref(),
            _ => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ProtectError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked(gate) => write!(f, "{}", gate),
            Self::Authority(err) => write!(f, "quota check failed: {}", err),
            Self::Operation(err) => write!(f, "{}", err),
        }
    }
}

impl<E: std::fmt::Display + std::fmt::Debug> std::error::Error for ProtectError<E> {}
