//! The remote authority contract the gateway is built against.
//!
//! # Responsibilities
//! - Define the four operations the gateway depends on
//! - Advertise which optional operations a backend supports
//!
//! # Design Decisions
//! - Capabilities are a plain struct snapshotted once at gateway
//!   construction, never consulted per call
//! - `lookup_by_external_ref` returns `Ok(None)` for the expected
//!   not-found case; `Err` is reserved for real failures

use async_trait::async_trait;

use crate::authority::types::{
    AuthorityResult, CreateIdentityRequest, CustomerRecord, QuotaDecision, UsageEvent,
};

/// Which optional authority operations a backend supports.
///
/// Backends that cannot look identities up, create them, or accept usage
/// events advertise that here; the gateway checks the snapshot once and
/// skips the corresponding steps instead of probing per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityCapabilities {
    /// `lookup_by_external_ref` is implemented.
    pub external_lookup: bool,

    /// `create_identity` is implemented.
    pub identity_creation: bool,

    /// `record_usage` is implemented.
    pub usage_recording: bool,
}

impl AuthorityCapabilities {
    /// Every operation supported.
    pub const fn full() -> Self {
        Self {
            external_lookup: true,
            identity_creation: true,
            usage_recording: true,
        }
    }

    /// Quota checking only; identity resolution degrades to fallback and
    /// usage recording is skipped.
    pub const fn check_only() -> Self {
        Self {
            external_lookup: false,
            identity_creation: false,
            usage_recording: false,
        }
    }
}

impl Default for AuthorityCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Contract of the remote metering/billing authority.
///
/// Every method is a network round-trip and may fail. Implementations must
/// be cheap to call through an `Arc<dyn RemoteAuthority>`.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Which optional operations this backend supports.
    ///
    /// The default claims everything; partial backends override it.
    fn capabilities(&self) -> AuthorityCapabilities {
        AuthorityCapabilities::full()
    }

    /// Ask whether `backend_ref` may use `product_ref` right now.
    ///
    /// Must always reflect current state; the gateway never caches the
    /// answer.
    async fn check_quota(
        &self,
        backend_ref: &str,
        product_ref: &str,
    ) -> AuthorityResult<QuotaDecision>;

    /// Record one invocation outcome. Fire-and-forget from the gateway's
    /// perspective; failures are retried and then dropped, never surfaced.
    async fn record_usage(&self, event: UsageEvent) -> AuthorityResult<()>;

    /// Find an existing identity by the external reference it was linked
    /// to. `Ok(None)` when no such identity exists.
    async fn lookup_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AuthorityResult<Option<CustomerRecord>>;

    /// Create a new identity. Fails with [`AuthorityError::Conflict`] when
    /// one already exists for the same external reference.
    ///
    /// [`AuthorityError::Conflict`]: crate::authority::AuthorityError::Conflict
    async fn create_identity(
        &self,
        request: CreateIdentityRequest,
    ) -> AuthorityResult<CustomerRecord>;
}
