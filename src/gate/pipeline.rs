//! The gating pipeline: resolve → check → execute or reject → record.
//!
//! # Responsibilities
//! - Sequence identity resolution, the quota check, the wrapped operation,
//!   and usage recording for one invocation
//! - Keep recording strictly best-effort: retried, then dropped, never
//!   surfaced to the caller
//!
//! # Design Decisions
//! - The quota check is never cached and never retried; quota state must
//!   always be current
//! - Recording runs on a detached task so the caller's latency does not
//!   include it, and its failure cannot reach the caller
//! - The wrapped operation's errors pass through unmodified

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::time::Instant;
use uuid::Uuid;

use crate::authority::api::{AuthorityCapabilities, RemoteAuthority};
use crate::authority::client::HttpAuthority;
use crate::authority::types::{AuthorityError, UsageEvent, UsageOutcome};
use crate::cache::keyed::KeyedCacheConfig;
use crate::config::loader::ConfigError;
use crate::config::schema::GatewayConfig;
use crate::config::validation::validate_config;
use crate::gate::types::{GateError, OperationMetadata, ProtectError};
use crate::identity::resolver::{CallerIdentity, IdentityResolver};
use crate::observability::{logging, metrics};
use crate::resilience::retry::{with_retry_if, RetryPolicy};

/// The metering gateway. Cheap to clone; clones share the same resolver
/// and authority handle, while separate gateways share nothing.
#[derive(Clone)]
pub struct Gateway {
    authority: Arc<dyn RemoteAuthority>,
    resolver: Arc<IdentityResolver>,
    capabilities: AuthorityCapabilities,
    recording_retry: RetryPolicy,
}

impl Gateway {
    /// Build a gateway over an injected authority (tests, custom backends).
    ///
    /// Must be called within a Tokio runtime: the resolver's flight cache
    /// spawns its sweeper here.
    pub fn new(config: GatewayConfig, authority: Arc<dyn RemoteAuthority>) -> Self {
        let capabilities = authority.capabilities();
        let cache_config = KeyedCacheConfig {
            ttl: Duration::from_secs(config.resolution_cache.ttl_secs),
            max_entries: config.resolution_cache.max_entries,
            sweep_interval: Duration::from_secs(config.resolution_cache.sweep_interval_secs),
            cache_failures: config.resolution_cache.cache_failures,
        };
        let resolver = Arc::new(IdentityResolver::new(
            config.identity.clone(),
            cache_config,
            Arc::clone(&authority),
        ));
        let recording_retry = RetryPolicy::from(&config.recording_retry);

        Self {
            authority,
            resolver,
            capabilities,
            recording_retry,
        }
    }

    /// Build a gateway talking HTTP to the configured authority.
    pub fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let authority =
            HttpAuthority::new(&config.authority).map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self::new(config, Arc::new(authority)))
    }

    /// The capability snapshot taken at construction.
    pub fn capabilities(&self) -> AuthorityCapabilities {
        self.capabilities
    }

    /// The identity resolver this gateway meters through.
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Wrap `operation` so each call is quota-gated and usage-recorded.
    ///
    /// `caller_ref` extracts who is calling from the operation's arguments;
    /// `operation` is the protected work itself. The returned wrapper
    /// passes the operation's result through unchanged when permitted.
    pub fn protect<Args, T, E, C, F, Fut>(
        &self,
        metadata: OperationMetadata,
        caller_ref: C,
        operation: F,
    ) -> ProtectedOperation<Args, T, E>
    where
        C: Fn(&Args) -> CallerIdentity + Send + Sync + 'static,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        ProtectedOperation {
            gateway: self.clone(),
            metadata: Arc::new(metadata),
            caller_ref: Box::new(caller_ref),
            operation: Box::new(move |args| operation(args).boxed()),
        }
    }

    /// Fire-and-forget usage recording. Retries the "identity not yet
    /// visible" race, then logs to the best-effort target and drops the
    /// event. Nothing here can reach the invoking caller.
    fn dispatch_recording(&self, event: UsageEvent) {
        if !self.capabilities.usage_recording {
            return;
        }
        let authority = Arc::clone(&self.authority);
        let policy = self.recording_retry.clone();
        tokio::spawn(async move {
            let outcome = event.outcome.as_str();
            let result = with_retry_if(
                &policy,
                |err: &AuthorityError, _| err.is_not_found(),
                || {
                    let authority = Arc::clone(&authority);
                    let event = event.clone();
                    async move { authority.record_usage(event).await }
                },
            )
            .await;

            match result {
                Ok(()) => metrics::record_usage_dispatch("recorded"),
                Err(err) => {
                    metrics::record_usage_dispatch("dropped");
                    tracing::warn!(
                        target: logging::BEST_EFFORT_TARGET,
                        error = %err,
                        outcome,
                        "usage recording failed after retries; event dropped"
                    );
                }
            }
        });
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("capabilities", &self.capabilities)
            .field("recording_retry", &self.recording_retry)
            .finish()
    }
}

type CallerRefFn<Args> = Box<dyn Fn(&Args) -> CallerIdentity + Send + Sync>;
type OperationFn<Args, T, E> =
    Box<dyn Fn(Args) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A quota-gated wrapper around one operation. Produced by
/// [`Gateway::protect`]; each [`invoke`](Self::invoke) runs the full
/// pipeline.
pub struct ProtectedOperation<Args, T, E> {
    gateway: Gateway,
    metadata: Arc<OperationMetadata>,
    caller_ref: CallerRefFn<Args>,
    operation: OperationFn<Args, T, E>,
}

impl<Args, T, E> ProtectedOperation<Args, T, E> {
    /// Run one gated invocation.
    ///
    /// Resolves the caller, checks quota (uncached), then either rejects
    /// with [`ProtectError::Blocked`] or runs the operation and passes its
    /// result through unchanged. Exactly one usage event is dispatched per
    /// outcome.
    pub async fn invoke(&self, args: Args) -> Result<T, ProtectError<E>> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let identity = (self.caller_ref)(&args);

        let backend_ref = self.gateway.resolver.ensure_customer(&identity).await;

        let decision = self
            .gateway
            .authority
            .check_quota(&backend_ref, &self.metadata.product_id)
            .await
            .map_err(ProtectError::Authority)?;

        // Prefer the fresher plan from the decision itself.
        let plan_id = if decision.plan.is_empty() {
            self.metadata.plan_id.clone()
        } else {
            decision.plan.clone()
        };

        if !decision.within_limits {
            metrics::record_gate_decision("blocked");
            tracing::debug!(
                backend_ref = %backend_ref,
                product_id = %self.metadata.product_id,
                remaining = decision.remaining,
                "invocation blocked by quota"
            );
            self.gateway.dispatch_recording(self.usage_event(
                &backend_ref,
                plan_id,
                UsageOutcome::Blocked,
                request_id,
                started,
            ));
            return Err(ProtectError::Blocked(GateError::payment_required(
                &decision,
                &self.metadata.product_id,
            )));
        }

        match (self.operation)(args).await {
            Ok(value) => {
                metrics::record_gate_decision("success");
                self.gateway.dispatch_recording(self.usage_event(
                    &backend_ref,
                    plan_id,
                    UsageOutcome::Success,
                    request_id,
                    started,
                ));
                Ok(value)
            }
            Err(err) => {
                metrics::record_gate_decision("failed");
                self.gateway.dispatch_recording(self.usage_event(
                    &backend_ref,
                    plan_id,
                    UsageOutcome::Failed,
                    request_id,
                    started,
                ));
                Err(ProtectError::Operation(err))
            }
        }
    }

    fn usage_event(
        &self,
        backend_ref: &str,
        plan_id: String,
        outcome: UsageOutcome,
        request_id: Uuid,
        started: Instant,
    ) -> UsageEvent {
        UsageEvent {
            backend_ref: backend_ref.to_string(),
            product_id: self.metadata.product_id.clone(),
            plan_id,
            outcome,
            action: self.metadata.action.clone(),
            request_id,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp_ms: unix_millis(),
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
