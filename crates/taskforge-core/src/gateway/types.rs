//! Wire types for the provider's messages endpoint.
//!
//! These map one-to-one onto the JSON the provider accepts and returns and
//! are (de)serialized with `serde`. Nothing outside the gateway module
//! should see a raw [`MessagesResponse`]; callers get an [`LlmExchange`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single `{role, content}` entry in the request's `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body: `{model, max_tokens, temperature, messages}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<Message>,
}

/// One block of the response's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Success body. `content` and `usage` are required; a body without them
/// violates the provider contract and is reported as malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl MessagesResponse {
    /// Concatenate every `text` block, or `None` when there is none.
    pub fn text(&self) -> Option<String> {
        let mut texts = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .peekable();
        texts.peek()?;
        Some(texts.collect())
    }
}

/// Error body: `{type: "error", error: {type, message}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

/// The outcome of one successful logical call: what was sent, what came
/// back, and what it cost. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmExchange {
    pub request: MessagesRequest,
    pub text: String,
    pub usage: Usage,
    pub stop_reason: Option<String>,
    /// Network attempts made, including the successful one.
    pub attempts: u32,
    /// Wall-clock time of the whole call, backoff included.
    pub latency: Duration,
}
