//! Conversation title generation.
//!
//! A new conversation gets its title from the model's summary of the first
//! user message. Any failure degrades to the message text itself; nothing
//! here is ever reported to the user.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::{ChatRequest, LlmChat, Message, ModelKind};
use crate::services::conversation;
use chatlist::Role;

const TITLE_PROMPT: &str = "Generate a concise, descriptive title (maximum 6 words) \
                            based on the user's message. Only return the title, nothing else.";
const TITLE_MAX_TOKENS: u32 = 32;
const TITLE_TEMPERATURE: f32 = 0.7;
pub const FALLBACK_TITLE_CHARS: usize = 80;

/// Trim a model answer and strip one leading and one trailing quote.
#[must_use]
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let unquoted = unquoted
        .strip_suffix(['"', '\''])
        .unwrap_or(unquoted);
    unquoted.trim().to_string()
}

/// The message itself as a title, on a single line and at most
/// [`FALLBACK_TITLE_CHARS`] characters.
#[must_use]
pub fn fallback_title(message: &str) -> String {
    let single_line = message.split_whitespace().collect::<Vec<_>>().join(" ");
    single_line.chars().take(FALLBACK_TITLE_CHARS).collect()
}

/// Ask the model for a short title for `message`.
pub async fn generate_title(llm: &dyn LlmChat, message: &str) -> String {
    let request = ChatRequest {
        model: ModelKind::Title,
        system: Some(TITLE_PROMPT.to_string()),
        messages: vec![Message::new(Role::User, message)],
        max_tokens: TITLE_MAX_TOKENS,
        temperature: Some(TITLE_TEMPERATURE),
    };

    match llm.chat(&request).await {
        Ok(response) => {
            let title = clean_title(&response.text);
            if title.is_empty() { fallback_title(message) } else { title }
        }
        Err(e) => {
            warn!(error = %e, "title generation failed; using message text");
            fallback_title(message)
        }
    }
}

/// Generate a title and store it unless the conversation already has one.
pub async fn assign_title(pool: &PgPool, llm: &dyn LlmChat, conversation_id: Uuid, message: &str) {
    let title = generate_title(llm, message).await;
    if title.is_empty() {
        return;
    }
    match conversation::set_title_if_missing(pool, conversation_id, &title).await {
        Ok(true) => info!(%conversation_id, %title, "conversation titled"),
        Ok(false) => {}
        Err(e) => warn!(%conversation_id, error = %e, "failed to store generated title"),
    }
}

#[cfg(test)]
#[path = "title_test.rs"]
mod tests;
