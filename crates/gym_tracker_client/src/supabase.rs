//! HTTP client for the hosted database's PostgREST interface.
//!
//! Requests authenticate with the service role key, so this client must only
//! ever run server-side.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::SupabaseConfig;
use crate::observability::{Upstream, record_upstream_call};
use crate::{Filters, Method, RestStore, UpstreamError};

pub const STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for `<project>/rest/v1` using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestSupabaseClient {
    base_url: String,
    service_key: SecretString,
    client: reqwest::Client,
}

impl ReqwestSupabaseClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The project URL (e.g., "https://abc.supabase.co")
    /// * `service_key` - The service role key, sent as `apikey` and bearer token
    pub fn new(base_url: &str, service_key: SecretString) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(STORE_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            client,
        })
    }

    /// Build a client from configuration, or `None` when the admin credentials are absent.
    pub fn from_config(config: &SupabaseConfig) -> Result<Option<Self>, UpstreamError> {
        match &config.service_role_key {
            Some(key) if config.is_admin_configured() => {
                Self::new(&config.url, key.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url,
            resource.trim_start_matches('/')
        )
    }

    /// Build an authenticated request.
    fn authed(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let key = self.service_key.expose_secret();
        self.client
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn execute(
        &self,
        method: Method,
        resource: &str,
        payload: Option<Value>,
        filters: Filters,
    ) -> Result<Option<Value>, UpstreamError> {
        let url = self.resource_url(resource);
        let mut request = self.authed(method.clone(), &url).query(&filters);
        if let Some(body) = &payload {
            request = request.json(body);
        }
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() >= 400 {
            let body: String = text.chars().take(256).collect();
            tracing::error!(%method, resource, status = status.as_u16(), %body, "store request failed");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[async_trait]
impl RestStore for ReqwestSupabaseClient {
    async fn request(
        &self,
        method: Method,
        resource: &str,
        payload: Option<Value>,
        filters: Filters,
    ) -> Result<Option<Value>, UpstreamError> {
        let start = Instant::now();
        let result = self.execute(method, resource, payload, filters).await;
        record_upstream_call(Upstream::Store, result.is_ok(), start.elapsed());
        result
    }
}
