//! HTTP client for the Anthropic Messages API.
//!
//! This module provides a reqwest-based implementation of the [`LlmProvider`](crate::LlmProvider) trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::AnthropicConfig;
use crate::observability::{Upstream, record_upstream_call};
use crate::{LlmProvider, Message, UpstreamError};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the Anthropic Messages API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestAnthropicClient {
    config: AnthropicConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

impl ReqwestAnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(LLM_TIMEOUT).build()?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }

    /// Extract error information from a failed response.
    async fn error_from_response(resp: reqwest::Response) -> UpstreamError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(256).collect();
        UpstreamError::Status { status, body }
    }

    async fn send(&self, messages: &[Message], max_tokens: u32) -> Result<String, UpstreamError> {
        let api_key = self.config.require_api_key()?;
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            messages,
        };
        let resp = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let err = Self::error_from_response(resp).await;
            tracing::error!(error = %err, "anthropic request failed");
            return Err(err);
        }
        let payload: MessagesResponse = resp.json().await?;
        Ok(payload
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<String>())
    }
}

#[async_trait]
impl LlmProvider for ReqwestAnthropicClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
    ) -> Result<String, UpstreamError> {
        let start = Instant::now();
        let result = self.send(&messages, max_tokens).await;
        record_upstream_call(Upstream::Llm, result.is_ok(), start.elapsed());
        result
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
