//! Shared utilities for integration testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use metering_gateway::authority::types::{
    AuthorityResult, CreateIdentityRequest, CustomerRecord, QuotaDecision, UsageEvent,
};
use metering_gateway::{AuthorityCapabilities, AuthorityError, RemoteAuthority, UsageOutcome};

/// A scripted in-memory authority.
///
/// Quota answers are popped from a script (defaulting to "allowed" when the
/// script runs dry), identities live in a map, and every recording attempt
/// is announced on a channel so tests can wait for the gateway's detached
/// recording tasks.
pub struct ScriptedAuthority {
    capabilities: AuthorityCapabilities,
    decisions: Mutex<VecDeque<AuthorityResult<QuotaDecision>>>,
    identities: Mutex<HashMap<String, CustomerRecord>>,
    created: AtomicU32,
    pub lookup_calls: AtomicU32,
    pub create_calls: AtomicU32,
    pub record_calls: AtomicU32,
    events: Mutex<Vec<UsageEvent>>,
    attempt_tx: mpsc::UnboundedSender<UsageOutcome>,
}

impl ScriptedAuthority {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<UsageOutcome>) {
        Self::with_capabilities(AuthorityCapabilities::full())
    }

    pub fn with_capabilities(
        capabilities: AuthorityCapabilities,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<UsageOutcome>) {
        let (attempt_tx, attempt_rx) = mpsc::unbounded_channel();
        let authority = Arc::new(Self {
            capabilities,
            decisions: Mutex::new(VecDeque::new()),
            identities: Mutex::new(HashMap::new()),
            created: AtomicU32::new(0),
            lookup_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            record_calls: AtomicU32::new(0),
            events: Mutex::new(Vec::new()),
            attempt_tx,
        });
        (authority, attempt_rx)
    }

    pub fn script_decision(&self, decision: QuotaDecision) {
        self.decisions.lock().unwrap().push_back(Ok(decision));
    }

    #[allow(dead_code)]
    pub fn script_error(&self, err: AuthorityError) {
        self.decisions.lock().unwrap().push_back(Err(err));
    }

    pub fn recorded_events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn identity_count(&self) -> usize {
        self.identities.lock().unwrap().len()
    }
}

pub fn allow(remaining: i64) -> QuotaDecision {
    QuotaDecision {
        within_limits: true,
        remaining,
        plan: "starter".to_string(),
        checkout_url: None,
    }
}

pub fn deny(checkout_url: &str) -> QuotaDecision {
    QuotaDecision {
        within_limits: false,
        remaining: 0,
        plan: "starter".to_string(),
        checkout_url: Some(checkout_url.to_string()),
    }
}

#[async_trait]
impl RemoteAuthority for ScriptedAuthority {
    fn capabilities(&self) -> AuthorityCapabilities {
        self.capabilities
    }

    async fn check_quota(&self, _: &str, _: &str) -> AuthorityResult<QuotaDecision> {
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(allow(1_000)))
    }

    async fn record_usage(&self, event: UsageEvent) -> AuthorityResult<()> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.attempt_tx.send(event.outcome);
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn lookup_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AuthorityResult<Option<CustomerRecord>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.identities.lock().unwrap().get(external_ref).cloned())
    }

    async fn create_identity(
        &self,
        request: CreateIdentityRequest,
    ) -> AuthorityResult<CustomerRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut identities = self.identities.lock().unwrap();
        if let Some(external_ref) = &request.external_ref {
            if identities.contains_key(external_ref) {
                return Err(AuthorityError::Conflict(format!(
                    "identity already exists for '{}'",
                    external_ref
                )));
            }
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let record = CustomerRecord {
            backend_ref: format!("cus_{:04}", n),
            email: Some(request.email),
            name: request.name,
            external_ref: request.external_ref.clone(),
        };
        if let Some(external_ref) = request.external_ref {
            identities.insert(external_ref, record.clone());
        }
        Ok(record)
    }
}
