//! HTTP error responses.
//!
//! Every failure leaves the server as `{"error": "<message>"}`. Internal
//! causes are logged where they are converted and never reach the body.

use std::fmt::Display;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::services::chat::ChatError;
use crate::services::conversation::ConversationError;

pub const CONVERSATION_NOT_FOUND: &str = "Conversation not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Unauthorized,
    NotFound(&'static str),
    BadRequest(String),
    ServiceUnavailable(&'static str),
    BadGateway(&'static str),
    Internal(&'static str),
}

impl ApiError {
    /// Log `cause` and produce a 500 carrying only `message`.
    pub fn internal(message: &'static str, cause: impl Display) -> Self {
        tracing::error!(error = %cause, "{message}");
        Self::Internal(message)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::BadRequest(message) => message,
            Self::NotFound(message)
            | Self::ServiceUnavailable(message)
            | Self::BadGateway(message)
            | Self::Internal(message) => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

// Extractor rejections keep the JSON error body. Use them through
// `axum_extra::extract::WithRejection<_, ApiError>`.

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Translate a conversation service error. `context` is the 500 message.
pub(crate) fn conversation_error(err: ConversationError, context: &'static str) -> ApiError {
    match err {
        ConversationError::NotFound(_) => ApiError::NotFound(CONVERSATION_NOT_FOUND),
        ConversationError::InvalidLimit(_)
        | ConversationError::InvalidOffset(_)
        | ConversationError::InvalidCursor(_) => ApiError::BadRequest(err.to_string()),
        ConversationError::Database(e) => ApiError::internal(context, e),
    }
}

pub(crate) fn chat_error(err: ChatError) -> ApiError {
    match err {
        ChatError::NotConfigured => ApiError::ServiceUnavailable("AI chat is not configured"),
        ChatError::EmptyMessage => ApiError::BadRequest(err.to_string()),
        ChatError::Conversation(e) => conversation_error(e, "Failed to start chat"),
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
