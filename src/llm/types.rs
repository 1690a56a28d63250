//! LLM types: provider-neutral messages, stream events and errors.

use chatlist::Role;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The required API key environment variable is not set.
    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl LlmError {
    /// Whether a retry of the same request could plausibly succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// Which configured model a request should run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// The conversational model used for replies.
    Chat,
    /// The (usually cheaper) model used for title generation.
    Title,
}

/// A single message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// A provider-neutral completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: ModelKind,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Response from a non-streaming chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub stop_reason: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One event of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text fragment to append to the reply.
    Delta(String),
    /// The provider finished the reply. Sent at most once, last.
    Done { stop_reason: String, input_tokens: u64, output_tokens: u64 },
}

// =============================================================================
// LLM CHAT TRAIT
// =============================================================================

/// Provider-neutral async trait for LLM chat. Enables mocking in tests.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// Send a chat request and wait for the full reply.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails or the response is malformed.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Send a chat request and forward the reply through `tx` as it arrives.
    ///
    /// Returns once the provider stream ends. A closed receiver stops the
    /// stream early without error.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails or a chunk is malformed.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
