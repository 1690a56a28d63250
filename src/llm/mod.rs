//! LLM: adapter for chat replies and title generation.
//!
//! DESIGN
//! ======
//! Configured entirely from environment variables. One OpenAI-compatible
//! client serves two model slots: the chat model for streamed replies and a
//! title model for short one-shot completions. Callers depend on the
//! [`LlmChat`] trait so tests can substitute a scripted model.

pub mod config;
pub mod openai;
pub mod types;

use tokio::sync::mpsc;

use config::LlmConfig;
pub use types::{ChatRequest, ChatResponse, LlmChat, LlmError, Message, ModelKind, StreamEvent};

// =============================================================================
// CLIENT
// =============================================================================

/// Concrete LLM client built by [`LlmClient::from_env`].
pub struct LlmClient {
    inner: openai::OpenAiClient,
    model: String,
    title_model: String,
}

impl LlmClient {
    /// Build an LLM client from environment variables.
    ///
    /// - `LLM_API_KEY_ENV`: name of env var holding the API key (e.g. `OPENAI_API_KEY`)
    /// - `LLM_MODEL`: chat model name (default `gpt-4.1-mini`)
    /// - `LLM_TITLE_MODEL`: title model name (default: the chat model)
    /// - `LLM_BASE_URL`: custom base URL for OpenAI-compatible APIs
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let inner = openai::OpenAiClient::new(config.api_key, config.base_url, config.timeouts)?;
        Ok(Self { inner, model: config.model, title_model: config.title_model })
    }

    /// Return the configured chat model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve a [`ModelKind`] to the configured model name.
    #[must_use]
    pub fn model_for(&self, kind: ModelKind) -> &str {
        match kind {
            ModelKind::Chat => &self.model,
            ModelKind::Title => &self.title_model,
        }
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.inner
            .chat(self.model_for(request.model), request)
            .await
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        self.inner
            .stream_chat(self.model_for(request.model), request, tx)
            .await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
