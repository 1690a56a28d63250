//! Conversation routes: list, CRUD, and message history.
//!
//! Handlers translate query/body shapes into service calls and map
//! [`ConversationError`](crate::services::conversation::ConversationError)
//! through [`conversation_error`]. Extractors are wrapped in
//! [`WithRejection`] so malformed input also answers with a JSON error.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum_extra::extract::WithRejection;
use chatlist::{Conversation, ConversationPage, ConversationWithMessages, Message, Role};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::{ApiError, conversation_error};
use crate::services::conversation::{self, ListQuery, NewMessage};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

impl From<ListParams> for ListQuery {
    fn from(params: ListParams) -> Self {
        Self { search: params.search, cursor: params.cursor, limit: params.limit }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationBody {
    pub id: Option<Uuid>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationBody {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMessageBody {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /api/conversations`: one page of the caller's conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Query(params), _): WithRejection<Query<ListParams>, ApiError>,
) -> Result<Json<ConversationPage>, ApiError> {
    let page = ListQuery::from(params)
        .validate()
        .map_err(|e| conversation_error(e, "Failed to list conversations"))?;
    let result = conversation::list_conversations(&state.pool, auth.user.id, &page)
        .await
        .map_err(|e| conversation_error(e, "Failed to list conversations"))?;
    Ok(Json(result))
}

/// `POST /api/conversations`: create a conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Option<Json<CreateConversationBody>>, JsonRejection>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let Json(body) = body?.unwrap_or_default();
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let created = conversation::create_conversation(&state.pool, auth.user.id, body.id, title)
        .await
        .map_err(|e| conversation_error(e, "Failed to create conversation"))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/conversations/{id}`: conversation with full history.
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<ConversationWithMessages>, ApiError> {
    let conversation = conversation::get_conversation(&state.pool, auth.user.id, id)
        .await
        .map_err(|e| conversation_error(e, "Failed to get conversation"))?;
    Ok(Json(conversation))
}

/// `PATCH /api/conversations/{id}`: rename.
pub async fn update_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(body), _): WithRejection<Json<UpdateConversationBody>, ApiError>,
) -> Result<Json<Conversation>, ApiError> {
    let updated = conversation::update_title(&state.pool, auth.user.id, id, &body.title)
        .await
        .map_err(|e| conversation_error(e, "Failed to update conversation"))?;
    Ok(Json(updated))
}

/// `DELETE /api/conversations/{id}`.
pub async fn delete_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<serde_json::Value>, ApiError> {
    conversation::delete_conversation(&state.pool, auth.user.id, id)
        .await
        .map_err(|e| conversation_error(e, "Failed to delete conversation"))?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `POST /api/conversations/{id}/messages`: append a message.
pub async fn add_message(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(body), _): WithRejection<Json<AddMessageBody>, ApiError>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let role: Role = body
        .role
        .parse()
        .map_err(|e: chatlist::ParseRoleError| ApiError::BadRequest(e.to_string()))?;
    if body.metadata.as_ref().is_some_and(|m| !m.is_object()) {
        return Err(ApiError::BadRequest("metadata must be a JSON object".into()));
    }
    let message = NewMessage { role, content: body.content, metadata: body.metadata };
    let stored = conversation::add_message(&state.pool, auth.user.id, id, message)
        .await
        .map_err(|e| conversation_error(e, "Failed to add message"))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `GET /api/conversations/{id}/messages?limit=&offset=`.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(params), _): WithRejection<Query<MessageParams>, ApiError>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages =
        conversation::list_messages(&state.pool, auth.user.id, id, params.limit, params.offset)
            .await
            .map_err(|e| conversation_error(e, "Failed to get messages"))?;
    Ok(Json(messages))
}

#[cfg(test)]
#[path = "conversations_test.rs"]
mod tests;
