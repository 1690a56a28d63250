//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool and the optional collaborators that are only
//! present when their environment variables are set: the LLM client and
//! the Google OAuth config.

use std::sync::Arc;

use sqlx::PgPool;

use crate::llm::LlmChat;
use crate::services::auth::GoogleConfig;
use crate::services::chat::DEFAULT_CHAT_MAX_TOKENS;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Optional LLM client. `None` if LLM env vars are not configured.
    pub llm: Option<Arc<dyn LlmChat>>,
    /// Optional Google OAuth config. `None` disables sign-in.
    pub google: Option<GoogleConfig>,
    /// Token budget for a chat reply.
    pub chat_max_tokens: u32,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, llm: Option<Arc<dyn LlmChat>>, google: Option<GoogleConfig>) -> Self {
        Self { pool, llm, google, chat_max_tokens: DEFAULT_CHAT_MAX_TOKENS }
    }

    #[must_use]
    pub fn with_chat_max_tokens(mut self, max_tokens: u32) -> Self {
        self.chat_max_tokens = max_tokens;
        self
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
