//! Upstream collaborators for the gym tracker gateway: the LLM provider and
//! the PostgREST-style store, each behind a small trait with a reqwest-based
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod anthropic;
pub mod config;
pub mod observability;
pub mod supabase;

pub use reqwest::Method;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl UpstreamError {
    /// HTTP status reported by the upstream, when the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Inline base64 image block.
    pub fn base64_image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                kind: "base64".into(),
                media_type: media_type.into(),
                data: data.into(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Text completion against the configured model.
#[async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    /// Send `messages` and return the concatenated text of the reply.
    async fn complete(&self, messages: Vec<Message>, max_tokens: u32)
    -> Result<String, UpstreamError>;

    /// Model name reported by `/health`.
    fn model(&self) -> &str;
}

/// Row filters in PostgREST syntax, e.g. `("user_id", "eq.abc")`.
pub type Filters = Vec<(String, String)>;

/// REST access to the hosted database.
#[async_trait]
pub trait RestStore: Send + Sync + 'static {
    /// Issue `method` against `resource` (a table path such as `sets`).
    ///
    /// Returns `None` when the upstream answered with an empty body.
    async fn request(
        &self,
        method: Method,
        resource: &str,
        payload: Option<Value>,
        filters: Filters,
    ) -> Result<Option<Value>, UpstreamError>;
}
