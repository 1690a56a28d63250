//! Chat service: persist the user's message, stream the model's reply.
//!
//! DESIGN
//! ======
//! The request path does the fallible work up front (ownership, storing the
//! user message, loading history) so those failures become ordinary HTTP
//! errors. The reply itself is produced by two spawned tasks: the provider
//! task pushes [`StreamEvent`]s into a bounded channel, and the relay task
//! accumulates them, forwards deltas to the HTTP response, and persists the
//! assistant message once the provider is done.
//!
//! A client that disconnects only closes the outgoing channel. The relay
//! keeps draining the provider so the full reply is still stored.
//!
//! When the provider fails after some text arrived, the partial reply is
//! stored with `{"truncated": true}` metadata and still answered with `done`.

use std::sync::Arc;

use chatlist::Role;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::llm::{ChatRequest, LlmChat, Message, ModelKind, StreamEvent};
use crate::services::conversation::{self, ConversationError, NewMessage};
use crate::services::title;
use crate::state::AppState;

pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 4096;
const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("AI chat is not configured")]
    NotConfigured,
    #[error("message content is empty")]
    EmptyMessage,
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// Event delivered to the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of the assistant reply.
    Delta(String),
    /// The reply finished and was stored under `message_id`.
    Done { message_id: Uuid },
    /// The reply could not be produced or stored.
    Error(String),
}

/// Store the user's message and start streaming the assistant reply.
///
/// # Errors
///
/// Returns [`ChatError::NotConfigured`] without an LLM, [`ChatError::EmptyMessage`]
/// for blank content, and conversation errors (including `NotFound` when the
/// id belongs to another user).
pub async fn start_chat(
    state: &AppState,
    user_id: Uuid,
    conversation_id: Uuid,
    content: &str,
) -> Result<mpsc::Receiver<ChatEvent>, ChatError> {
    let llm = state.llm.clone().ok_or(ChatError::NotConfigured)?;
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let (conversation, created) =
        conversation::ensure_conversation(&state.pool, user_id, conversation_id).await?;
    let message = NewMessage::new(Role::User, content);
    conversation::add_message(&state.pool, user_id, conversation_id, message).await?;

    if conversation.title.is_none() {
        let llm = Arc::clone(&llm);
        spawn_title_task(state.pool.clone(), llm, conversation_id, content.to_string());
    }

    let history = conversation::history(&state.pool, conversation_id).await?;
    let request = ChatRequest {
        model: ModelKind::Chat,
        system: None,
        messages: history
            .into_iter()
            .map(|m| Message::new(m.role, m.content))
            .collect(),
        max_tokens: state.chat_max_tokens,
        temperature: None,
    };
    let turns = request.messages.len();
    info!(%conversation_id, %user_id, created, turns, "chat reply started");

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let pool = state.pool.clone();
    tokio::spawn(async move {
        relay_reply(pool, llm, request, user_id, conversation_id, tx).await;
    });
    Ok(rx)
}

fn spawn_title_task(pool: PgPool, llm: Arc<dyn LlmChat>, conversation_id: Uuid, message: String) {
    tokio::spawn(async move {
        title::assign_title(&pool, llm.as_ref(), conversation_id, &message).await;
    });
}

async fn relay_reply(
    pool: PgPool,
    llm: Arc<dyn LlmChat>,
    request: ChatRequest,
    user_id: Uuid,
    conversation_id: Uuid,
    tx: mpsc::Sender<ChatEvent>,
) {
    let Some(reply) = collect_reply(llm, request, &tx).await else {
        return;
    };

    let truncated = reply.truncated;
    let stored =
        conversation::add_message(&pool, user_id, conversation_id, reply.into_message()).await;
    let event = match stored {
        Ok(message) => {
            info!(%conversation_id, message_id = %message.id, truncated, "chat reply stored");
            ChatEvent::Done { message_id: message.id }
        }
        Err(e) => {
            error!(%conversation_id, error = %e, "failed to store chat reply");
            ChatEvent::Error("Failed to save the reply".to_string())
        }
    };
    let _ = tx.send(event).await;
}

/// Assistant text gathered from one provider stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub text: String,
    /// The provider failed before finishing.
    pub truncated: bool,
}

impl Reply {
    pub(crate) fn into_message(self) -> NewMessage {
        NewMessage {
            role: Role::Assistant,
            content: self.text,
            metadata: self.truncated.then(|| serde_json::json!({ "truncated": true })),
        }
    }
}

/// Run the provider stream to completion, forwarding deltas to `tx`.
///
/// Returns the reply, marked truncated if the provider failed midway, or
/// `None` after sending an error event when no text arrived at all.
pub(crate) async fn collect_reply(
    llm: Arc<dyn LlmChat>,
    request: ChatRequest,
    tx: &mpsc::Sender<ChatEvent>,
) -> Option<Reply> {
    let (llm_tx, mut llm_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let producer = tokio::spawn(async move { llm.stream_chat(&request, llm_tx).await });

    let mut reply = String::new();
    let mut client_open = true;
    while let Some(event) = llm_rx.recv().await {
        match event {
            StreamEvent::Delta(text) => {
                reply.push_str(&text);
                if client_open && tx.send(ChatEvent::Delta(text)).await.is_err() {
                    info!("chat client disconnected; finishing reply in background");
                    client_open = false;
                }
            }
            StreamEvent::Done { stop_reason, input_tokens, output_tokens } => {
                info!(%stop_reason, input_tokens, output_tokens, "model stream finished");
            }
        }
    }

    let failed = match producer.await {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            error!(error = %e, retryable = e.retryable(), "model stream failed");
            true
        }
        Err(e) => {
            error!(error = %e, "model stream task panicked");
            true
        }
    };

    if reply.is_empty() {
        if !failed {
            warn!("model returned an empty reply");
        }
        let _ = tx.send(ChatEvent::Error("Failed to generate a reply".to_string())).await;
        return None;
    }
    if failed {
        warn!(chars = reply.chars().count(), "storing truncated reply");
    }
    Some(Reply { text: reply, truncated: failed })
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
