//! Chat route: streams the assistant reply as Server-Sent Events.
//!
//! Every event carries a JSON payload:
//!
//! - `delta` → `{"text": "..."}`, one per reply fragment
//! - `done` → `{"messageId": "..."}`, once the reply is stored
//! - `error` → `{"error": "..."}`, terminal
//!
//! Fragments are JSON-encoded so newlines in model output never split an
//! SSE field.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum_extra::extract::WithRejection;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, chat_error};
use crate::services::chat::{self, ChatEvent};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub conversation_id: Uuid,
    pub content: String,
}

/// `POST /api/chat`: store the message, then stream the reply.
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Json(body), _): WithRejection<Json<ChatBody>, ApiError>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let rx = chat::start_chat(&state, auth.user.id, body.conversation_id, &body.content)
        .await
        .map_err(chat_error)?;
    Ok(Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()))
}

/// Event name and JSON payload for one chat event.
pub(crate) fn event_payload(event: ChatEvent) -> (&'static str, serde_json::Value) {
    match event {
        ChatEvent::Delta(text) => ("delta", serde_json::json!({ "text": text })),
        ChatEvent::Done { message_id } => ("done", serde_json::json!({ "messageId": message_id })),
        ChatEvent::Error(error) => ("error", serde_json::json!({ "error": error })),
    }
}

fn to_sse(event: ChatEvent) -> Event {
    let (name, payload) = event_payload(event);
    Event::default()
        .event(name)
        .json_data(&payload)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode chat event");
            Event::default().event("error").data("Failed to encode event")
        })
}

/// Adapt the service channel into an SSE stream. Ends when the sender drops.
pub(crate) fn event_stream(
    rx: mpsc::Receiver<ChatEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(event)), rx))
    })
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
