//! Shared test utilities: scripted `RestStore` and `LlmProvider` mocks and an
//! application state builder for handler tests.
#![cfg(test)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gym_tracker_client::{Filters, LlmProvider, Message, Method, RestStore, UpstreamError};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;

use crate::auth::Authenticator;
use crate::settings::AppSettings;
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq)]
pub struct StoreCall {
    pub method: Method,
    pub resource: String,
    pub payload: Option<Value>,
    pub filters: Filters,
}

/// Store answering from a queue of scripted responses; an empty queue
/// answers `Ok(None)`.
#[derive(Default)]
pub struct MockStore {
    responses: Mutex<VecDeque<Result<Option<Value>, UpstreamError>>>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: Result<Option<Value>, UpstreamError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestStore for MockStore {
    async fn request(
        &self,
        method: Method,
        resource: &str,
        payload: Option<Value>,
        filters: Filters,
    ) -> Result<Option<Value>, UpstreamError> {
        self.calls.lock().unwrap().push(StoreCall {
            method,
            resource: resource.to_string(),
            payload,
            filters,
        });
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// LLM returning scripted replies and recording every request.
pub struct MockLlm {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
    requests: Mutex<Vec<(Vec<Message>, u32)>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        let llm = Self::new();
        llm.push_reply(Ok(text.to_string()));
        llm
    }

    pub fn push_reply(&self, reply: Result<String, UpstreamError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<(Vec<Message>, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn complete(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
    ) -> Result<String, UpstreamError> {
        self.requests.lock().unwrap().push((messages, max_tokens));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("{}".to_string()))
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

/// Application state with unverified auth, the given collaborators and a
/// local (uninstalled) metrics recorder.
pub fn test_state(
    settings: AppSettings,
    llm: Arc<MockLlm>,
    store: Option<Arc<MockStore>>,
) -> Arc<AppState> {
    let auth = Authenticator::from_config(&settings.supabase);
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    Arc::new(AppState::new(
        settings,
        llm,
        store.map(|s| s as Arc<dyn RestStore>),
        auth,
        metrics,
    ))
}

/// Unsigned token accepted by the unverified authenticator.
pub fn bearer_for(user_id: &str) -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + 3600;
    let payload = URL_SAFE_NO_PAD.encode(serde_json::json!({"sub": user_id, "exp": exp}).to_string());
    format!("Bearer {header}.{payload}.sig")
}
