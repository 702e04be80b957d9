//! Middleware layer for cross-cutting concerns.
//!
//! [`LoggingMiddleware`] sits between the handlers and the upstream
//! collaborators and times every call at debug level. The wrapped client
//! records its own metrics.

use std::sync::Arc;
use std::time::Instant;

use gym_tracker_client::{Filters, LlmProvider, Message, Method, RestStore, UpstreamError};
use serde_json::Value;
use tracing::debug;

/// Wrapper adding call logging to an [`LlmProvider`] or [`RestStore`].
#[derive(Clone)]
pub struct LoggingMiddleware<C> {
    inner: Arc<C>,
}

impl<C> LoggingMiddleware<C> {
    pub fn new(client: C) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    /// Execute a fallible operation with logging.
    async fn with_logging<F, Fut, T>(&self, operation: F, name: &str) -> Result<T, UpstreamError>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: std::future::Future<Output = Result<T, UpstreamError>>,
    {
        let start = Instant::now();
        debug!("Starting operation: {}", name);

        let result = operation(self.inner.clone()).await;

        let duration = start.elapsed();
        match &result {
            Ok(_) => {
                debug!(
                    "Operation completed successfully: {} in {:?}",
                    name, duration
                );
            }
            Err(e) => {
                debug!(
                    "Operation failed: {} in {:?} - error: {}",
                    name, duration, e
                );
            }
        }

        result
    }
}

#[async_trait::async_trait]
impl<C: LlmProvider> LlmProvider for LoggingMiddleware<C> {
    async fn complete(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
    ) -> Result<String, UpstreamError> {
        self.with_logging(
            |client| async move { client.complete(messages, max_tokens).await },
            "llm.complete",
        )
        .await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[async_trait::async_trait]
impl<C: RestStore> RestStore for LoggingMiddleware<C> {
    async fn request(
        &self,
        method: Method,
        resource: &str,
        payload: Option<Value>,
        filters: Filters,
    ) -> Result<Option<Value>, UpstreamError> {
        let name = format!("store.{} {}", method, resource);
        self.with_logging(
            |client| async move { client.request(method, resource, payload, filters).await },
            &name,
        )
        .await
    }
}
