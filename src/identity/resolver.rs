//! Caller-to-backend identity resolution.
//!
//! # Responsibilities
//! - Map a caller-supplied reference to the authority's stable reference
//! - Collapse concurrent resolutions for the same key onto one flight
//! - Create missing identities idempotently, recovering from conflicts
//!
//! # Design Decisions
//! - Resolution is infallible from the caller's point of view: every
//!   failure path degrades to the caller-supplied reference instead of
//!   blocking the gated operation
//! - Creation runs at most once per key per process, tracked in an
//!   attempt set that outlives the flight cache's TTL
//! - Fallback results are never written to the mapping, so a later call
//!   can still pick up the real backend reference

use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::authority::api::{AuthorityCapabilities, RemoteAuthority};
use crate::authority::types::{AuthorityError, CreateIdentityRequest};
use crate::cache::keyed::{KeyedCacheConfig, KeyedRequestCache};
use crate::config::schema::IdentityConfig;
use crate::observability::metrics;

/// Optional profile details supplied by the host for identity creation.
#[derive(Debug, Clone, Default)]
pub struct ProfileHints {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Who is making a gated call, as the host knows them.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    /// Host-supplied reference; may already be backend-native.
    pub caller_ref: String,

    /// Identifier from an upstream auth system, used to find an existing
    /// backend identity before creating one.
    pub external_ref: Option<String>,

    /// Profile details for creation; placeholders are synthesized when
    /// absent.
    pub hints: ProfileHints,
}

impl CallerIdentity {
    pub fn new(caller_ref: impl Into<String>) -> Self {
        Self {
            caller_ref: caller_ref.into(),
            external_ref: None,
            hints: ProfileHints::default(),
        }
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.hints.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.hints.name = Some(name.into());
        self
    }
}

impl From<&str> for CallerIdentity {
    fn from(caller_ref: &str) -> Self {
        Self::new(caller_ref)
    }
}

impl From<String> for CallerIdentity {
    fn from(caller_ref: String) -> Self {
        Self::new(caller_ref)
    }
}

/// Resolves caller references to backend references, deduplicating and
/// caching the work.
///
/// All state is owned by the instance; independent resolvers share nothing.
pub struct IdentityResolver {
    authority: Arc<dyn RemoteAuthority>,
    capabilities: AuthorityCapabilities,
    config: IdentityConfig,
    /// caller_ref → backend_ref, for the life of this instance.
    mappings: Arc<DashMap<String, String>>,
    /// Flight keys for which creation has already been attempted.
    creation_attempted: Arc<DashSet<String>>,
    flights: KeyedRequestCache<String, AuthorityError>,
}

impl IdentityResolver {
    /// Build a resolver. The authority's capabilities are snapshotted here
    /// and never consulted again.
    pub fn new(
        config: IdentityConfig,
        cache_config: KeyedCacheConfig,
        authority: Arc<dyn RemoteAuthority>,
    ) -> Self {
        let capabilities = authority.capabilities();
        Self {
            authority,
            capabilities,
            config,
            mappings: Arc::new(DashMap::new()),
            creation_attempted: Arc::new(DashSet::new()),
            flights: KeyedRequestCache::new(cache_config),
        }
    }

    /// Resolve a caller to a backend-stable reference.
    ///
    /// Never fails: lookup and creation problems degrade to the
    /// caller-supplied reference after logging.
    pub async fn ensure_customer(&self, identity: &CallerIdentity) -> String {
        let caller_ref = identity.caller_ref.as_str();

        if caller_ref.starts_with(&self.config.backend_ref_prefix) {
            metrics::record_resolution("backend_native");
            return caller_ref.to_string();
        }
        if caller_ref == self.config.anonymous_ref {
            metrics::record_resolution("anonymous");
            return caller_ref.to_string();
        }
        if let Some(mapped) = self.mappings.get(caller_ref) {
            metrics::record_resolution("mapped");
            return mapped.clone();
        }

        let key = identity
            .external_ref
            .clone()
            .unwrap_or_else(|| caller_ref.to_string());

        let authority = Arc::clone(&self.authority);
        let capabilities = self.capabilities;
        let mappings = Arc::clone(&self.mappings);
        let attempted = Arc::clone(&self.creation_attempted);
        let request = identity.clone();
        let flight_key = key.clone();

        let resolved = match self
            .flights
            .resolve(&key, move || {
                resolve_uncached(
                    authority,
                    capabilities,
                    mappings,
                    attempted,
                    request,
                    flight_key,
                )
            })
            .await
        {
            Ok(backend_ref) => backend_ref,
            // The producer degrades internally and returns Ok on every
            // path; this arm only fires for a cached failure when the host
            // enabled failure caching.
            Err(err) => {
                tracing::warn!(
                    caller_ref = %caller_ref,
                    error = %err,
                    "identity resolution failed; using caller reference"
                );
                metrics::record_resolution("fallback");
                caller_ref.to_string()
            }
        };

        if resolved != caller_ref {
            self.mappings.insert(caller_ref.to_string(), resolved.clone());
        }
        resolved
    }

    /// Number of caller references with a stored backend mapping.
    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("capabilities", &self.capabilities)
            .field("mappings", &self.mappings.len())
            .finish()
    }
}

/// The flight body: lookup → attempt check → create → conflict recovery.
/// Runs once per key regardless of how many callers are waiting.
async fn resolve_uncached(
    authority: Arc<dyn RemoteAuthority>,
    capabilities: AuthorityCapabilities,
    mappings: Arc<DashMap<String, String>>,
    attempted: Arc<DashSet<String>>,
    identity: CallerIdentity,
    key: String,
) -> Result<String, AuthorityError> {
    let caller_ref = identity.caller_ref.clone();

    if let Some(external_ref) = identity.external_ref.as_deref() {
        if capabilities.external_lookup {
            match authority.lookup_by_external_ref(external_ref).await {
                Ok(Some(record)) => {
                    metrics::record_resolution("looked_up");
                    return Ok(record.backend_ref);
                }
                Ok(None) => {}
                Err(err) => {
                    // Transient lookup trouble must not fail the caller's
                    // request; creation below may still succeed.
                    tracing::warn!(
                        external_ref = %external_ref,
                        error = %err,
                        "external reference lookup failed"
                    );
                }
            }
        }
    }

    // insert() is false when a prior flight in this process already tried
    // to create this identity; settle for the best reference we have.
    if !attempted.insert(key) {
        let best = mappings
            .get(&caller_ref)
            .map(|mapped| mapped.clone())
            .unwrap_or_else(|| caller_ref.clone());
        return Ok(best);
    }

    if !capabilities.identity_creation {
        metrics::record_resolution("fallback");
        return Ok(caller_ref);
    }

    let request = CreateIdentityRequest {
        email: identity
            .hints
            .email
            .clone()
            .unwrap_or_else(|| placeholder_email(&caller_ref)),
        name: identity.hints.name.clone().or_else(|| Some(caller_ref.clone())),
        external_ref: identity.external_ref.clone(),
    };

    match authority.create_identity(request).await {
        Ok(record) => {
            metrics::record_resolution("created");
            tracing::debug!(
                caller_ref = %caller_ref,
                backend_ref = %record.backend_ref,
                "created backend identity"
            );
            Ok(record.backend_ref)
        }
        Err(err) if err.is_conflict() => {
            recover_from_conflict(
                authority,
                capabilities,
                identity.external_ref.as_deref(),
                caller_ref,
            )
            .await
        }
        Err(err) => {
            tracing::warn!(
                caller_ref = %caller_ref,
                error = %err,
                "identity creation failed; using caller reference"
            );
            metrics::record_resolution("fallback");
            Ok(caller_ref)
        }
    }
}

/// The identity already exists (another process won the creation race);
/// one corrective lookup finds it, anything else degrades to the caller
/// reference.
async fn recover_from_conflict(
    authority: Arc<dyn RemoteAuthority>,
    capabilities: AuthorityCapabilities,
    external_ref: Option<&str>,
    caller_ref: String,
) -> Result<String, AuthorityError> {
    if let Some(external_ref) = external_ref {
        if capabilities.external_lookup {
            match authority.lookup_by_external_ref(external_ref).await {
                Ok(Some(record)) => {
                    metrics::record_resolution("recovered");
                    return Ok(record.backend_ref);
                }
                Ok(None) => {
                    tracing::warn!(
                        external_ref = %external_ref,
                        "creation conflict but corrective lookup found nothing"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        external_ref = %external_ref,
                        error = %err,
                        "corrective lookup after conflict failed"
                    );
                }
            }
        }
    }
    metrics::record_resolution("fallback");
    Ok(caller_ref)
}

/// Synthesize a deliverable-nowhere placeholder address from the caller
/// reference.
fn placeholder_email(caller_ref: &str) -> String {
    let local: String = caller_ref
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let local = if local.is_empty() {
        "customer".to_string()
    } else {
        local
    };
    format!("{}@placeholder.invalid", local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::types::{AuthorityResult, CustomerRecord, QuotaDecision, UsageEvent};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeAuthority {
        capabilities: Option<AuthorityCapabilities>,
        records_by_ext: DashMap<String, CustomerRecord>,
        create_conflict: AtomicBool,
        create_error: AtomicBool,
        lookup_error: AtomicBool,
        create_delay: Option<Duration>,
        /// Lookups that report "not found" before the map is consulted.
        lookup_misses_remaining: AtomicU32,
        lookup_calls: AtomicU32,
        create_calls: AtomicU32,
    }

    impl FakeAuthority {
        fn with_record(self, external_ref: &str, backend_ref: &str) -> Self {
            self.records_by_ext.insert(
                external_ref.to_string(),
                CustomerRecord {
                    backend_ref: backend_ref.to_string(),
                    email: None,
                    name: None,
                    external_ref: Some(external_ref.to_string()),
                },
            );
            self
        }
    }

    #[async_trait]
    impl RemoteAuthority for FakeAuthority {
        fn capabilities(&self) -> AuthorityCapabilities {
            self.capabilities.unwrap_or_default()
        }

        async fn check_quota(&self, _: &str, _: &str) -> AuthorityResult<QuotaDecision> {
            unreachable!("resolver never checks quota")
        }

        async fn record_usage(&self, _: UsageEvent) -> AuthorityResult<()> {
            unreachable!("resolver never records usage")
        }

        async fn lookup_by_external_ref(
            &self,
            external_ref: &str,
        ) -> AuthorityResult<Option<CustomerRecord>> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            if self.lookup_error.load(Ordering::SeqCst) {
                return Err(AuthorityError::Transport("lookup down".into()));
            }
            let misses = &self.lookup_misses_remaining;
            if misses.load(Ordering::SeqCst) > 0 {
                misses.fetch_sub(1, Ordering::SeqCst);
                return Ok(None);
            }
            Ok(self
                .records_by_ext
                .get(external_ref)
                .map(|r| r.value().clone()))
        }

        async fn create_identity(
            &self,
            request: CreateIdentityRequest,
        ) -> AuthorityResult<CustomerRecord> {
            let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.create_delay {
                tokio::time::sleep(delay).await;
            }
            if self.create_conflict.load(Ordering::SeqCst) {
                return Err(AuthorityError::Conflict("already exists".into()));
            }
            if self.create_error.load(Ordering::SeqCst) {
                return Err(AuthorityError::Api {
                    status: 500,
                    message: "creation down".into(),
                });
            }
            let record = CustomerRecord {
                backend_ref: format!("cus_created_{}", n),
                email: Some(request.email),
                name: request.name,
                external_ref: request.external_ref.clone(),
            };
            if let Some(ext) = request.external_ref {
                self.records_by_ext.insert(ext, record.clone());
            }
            Ok(record)
        }
    }

    fn resolver_with(fake: FakeAuthority) -> (IdentityResolver, Arc<FakeAuthority>) {
        let authority = Arc::new(fake);
        let resolver = IdentityResolver::new(
            IdentityConfig::default(),
            KeyedCacheConfig::default(),
            authority.clone(),
        );
        (resolver, authority)
    }

    #[tokio::test]
    async fn test_backend_native_refs_pass_through() {
        let (resolver, authority) = resolver_with(FakeAuthority::default());
        let resolved = resolver
            .ensure_customer(&CallerIdentity::new("cus_existing"))
            .await;
        assert_eq!(resolved, "cus_existing");
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.mapping_count(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_sentinel_passes_through() {
        let (resolver, authority) = resolver_with(FakeAuthority::default());
        let resolved = resolver
            .ensure_customer(&CallerIdentity::new("anonymous"))
            .await;
        assert_eq!(resolved, "anonymous");
        assert_eq!(authority.lookup_calls.load(Ordering::SeqCst), 0);
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_existing_identity_found_by_external_ref() {
        let fake = FakeAuthority::default().with_record("ext-1", "cus_found");
        let (resolver, authority) = resolver_with(fake);

        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");
        assert_eq!(resolver.ensure_customer(&identity).await, "cus_found");
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent_and_creates_once() {
        let (resolver, authority) = resolver_with(FakeAuthority::default());
        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");

        let first = resolver.ensure_customer(&identity).await;
        let second = resolver.ensure_customer(&identity).await;

        assert_eq!(first, "cus_created_0");
        assert_eq!(first, second);
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 1);
        // Second call was served from the mapping, not another lookup.
        assert_eq!(authority.lookup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_collapse() {
        let fake = FakeAuthority {
            create_delay: Some(Duration::from_millis(20)),
            ..FakeAuthority::default()
        };
        let (resolver, authority) = resolver_with(fake);
        let resolver = Arc::new(resolver);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .ensure_customer(&CallerIdentity::new("u1").with_external_ref("ext-1"))
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.iter().all(|r| r == "cus_created_0"));
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conflict_recovers_via_lookup() {
        // Another process created the identity between our lookup (which
        // misses) and our create (which conflicts); the corrective lookup
        // then finds it.
        let fake = FakeAuthority::default().with_record("ext-1", "cus_theirs");
        fake.create_conflict.store(true, Ordering::SeqCst);
        fake.lookup_misses_remaining.store(1, Ordering::SeqCst);
        let (resolver, authority) = resolver_with(fake);

        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");
        let resolved = resolver.ensure_customer(&identity).await;

        assert_eq!(resolved, "cus_theirs");
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(authority.lookup_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades_to_creation() {
        let fake = FakeAuthority::default();
        fake.lookup_error.store(true, Ordering::SeqCst);
        let (resolver, authority) = resolver_with(fake);

        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");
        let resolved = resolver.ensure_customer(&identity).await;

        // The broken lookup is logged and creation proceeds anyway.
        assert_eq!(resolved, "cus_created_0");
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_creation_failure_falls_back_to_caller_ref() {
        let fake = FakeAuthority::default();
        fake.create_error.store(true, Ordering::SeqCst);
        let (resolver, authority) = resolver_with(fake);

        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");
        assert_eq!(resolver.ensure_customer(&identity).await, "u1");
        // Fallbacks are not written to the mapping.
        assert_eq!(resolver.mapping_count(), 0);
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_attempted_once_even_after_cache_expiry() {
        let fake = FakeAuthority::default();
        fake.create_error.store(true, Ordering::SeqCst);
        let authority = Arc::new(fake);
        let cache_config = KeyedCacheConfig {
            ttl: Duration::from_secs(1),
            ..KeyedCacheConfig::default()
        };
        let resolver = IdentityResolver::new(
            IdentityConfig::default(),
            cache_config,
            authority.clone(),
        );

        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");
        assert_eq!(resolver.ensure_customer(&identity).await, "u1");

        // The flight cache expires, but the attempt set persists: no second
        // creation call.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(resolver.ensure_customer(&identity).await, "u1");
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capability_gating_skips_unsupported_operations() {
        let fake = FakeAuthority {
            capabilities: Some(AuthorityCapabilities::check_only()),
            ..FakeAuthority::default()
        };
        let (resolver, authority) = resolver_with(fake);

        let identity = CallerIdentity::new("u1").with_external_ref("ext-1");
        assert_eq!(resolver.ensure_customer(&identity).await, "u1");
        assert_eq!(authority.lookup_calls.load(Ordering::SeqCst), 0);
        assert_eq!(authority.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_profile_hints_reach_creation() {
        let (resolver, authority) = resolver_with(FakeAuthority::default());
        let identity = CallerIdentity::new("u1")
            .with_external_ref("ext-1")
            .with_email("real@example.com")
            .with_name("User One");

        resolver.ensure_customer(&identity).await;
        let record = authority.records_by_ext.get("ext-1").unwrap();
        assert_eq!(record.email.as_deref(), Some("real@example.com"));
        assert_eq!(record.name.as_deref(), Some("User One"));
    }

    #[test]
    fn test_placeholder_email_sanitizes_reference() {
        assert_eq!(placeholder_email("user-42"), "user-42@placeholder.invalid");
        assert_eq!(
            placeholder_email("spaced out!ref"),
            "spacedoutref@placeholder.invalid"
        );
        assert_eq!(placeholder_email("@@@"), "customer@placeholder.invalid");
    }
}
