//! HTTP client for the remote authority.
//!
//! # Responsibilities
//! - Build a reqwest client from [`AuthorityConfig`] (base URL, API key,
//!   timeout)
//! - Map each authority operation onto its endpoint
//! - Translate HTTP statuses into the [`AuthorityError`] taxonomy

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::authority::api::RemoteAuthority;
use crate::authority::types::{
    AuthorityError, AuthorityResult, CreateIdentityRequest, CustomerRecord, QuotaDecision,
    UsageEvent,
};
use crate::config::schema::AuthorityConfig;

/// Longest error-body excerpt kept in an [`AuthorityError::Api`] message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct QuotaCheckRequest<'a> {
    customer_ref: &'a str,
    product_ref: &'a str,
}

/// Reqwest-backed implementation of [`RemoteAuthority`].
#[derive(Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    /// Normalized base URL, no trailing slash.
    base_url: String,
    api_key: String,
}

impl HttpAuthority {
    /// Build a client from configuration.
    ///
    /// Fails when the base URL is not an absolute http(s) URL or the
    /// underlying HTTP client cannot be constructed.
    pub fn new(config: &AuthorityConfig) -> AuthorityResult<Self> {
        let parsed: url::Url = config.base_url.parse().map_err(|e| {
            AuthorityError::Config(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AuthorityError::Config(format!(
                "unsupported base URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AuthorityError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    /// Drain the response body into an `Api` error, keeping a bounded
    /// excerpt.
    async fn api_error(response: reqwest::Response) -> AuthorityError {
        let status = response.status().as_u16();
        let mut message = response.text().await.unwrap_or_default();
        message.truncate(MAX_ERROR_BODY);
        AuthorityError::Api { status, message }
    }
}

fn transport(err: reqwest::Error) -> AuthorityError {
    AuthorityError::Transport(err.to_string())
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn check_quota(
        &self,
        backend_ref: &str,
        product_ref: &str,
    ) -> AuthorityResult<QuotaDecision> {
        let body = QuotaCheckRequest {
            customer_ref: backend_ref,
            product_ref,
        };
        let response = self
            .request(self.client.post(self.endpoint("/v1/quota/check")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            response.json::<QuotaDecision>().await.map_err(transport)
        } else if status.as_u16() == 404 {
            Err(AuthorityError::NotFound(format!(
                "no quota state for customer '{}'",
                backend_ref
            )))
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn record_usage(&self, event: UsageEvent) -> AuthorityResult<()> {
        let response = self
            .request(self.client.post(self.endpoint("/v1/usage")))
            .json(&event)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 {
            // Identity created moments ago and not yet indexed by the usage
            // side; the caller retries on this.
            Err(AuthorityError::NotFound(format!(
                "customer '{}' not visible to usage recording yet",
                event.backend_ref
            )))
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn lookup_by_external_ref(
        &self,
        external_ref: &str,
    ) -> AuthorityResult<Option<CustomerRecord>> {
        let response = self
            .request(self.client.get(self.endpoint("/v1/identities/lookup")))
            .query(&[("external_ref", external_ref)])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            let record = response.json::<CustomerRecord>().await.map_err(transport)?;
            Ok(Some(record))
        } else if status.as_u16() == 404 {
            Ok(None)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn create_identity(
        &self,
        request: CreateIdentityRequest,
    ) -> AuthorityResult<CustomerRecord> {
        let response = self
            .request(self.client.post(self.endpoint("/v1/identities")))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            response.json::<CustomerRecord>().await.map_err(transport)
        } else if status.as_u16() == 409 {
            Err(AuthorityError::Conflict(format!(
                "identity already exists for external ref {:?}",
                request.external_ref
            )))
        } else {
            Err(Self::api_error(response).await)
        }
    }
}

impl std::fmt::Debug for HttpAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthority")
            .field("base_url", &self.base_url)
            .field("api_key_set", &!self.api_key.is_empty())
            .finish()
    }
}
