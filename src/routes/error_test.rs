use uuid::Uuid;

use super::*;
use chatlist::CursorError;

async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn unauthorized_body() {
    let (status, body) = body_json(ApiError::Unauthorized).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, serde_json::json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn internal_body_hides_cause() {
    let err = ApiError::internal("Failed to list conversations", "connection refused");
    let (status, body) = body_json(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to list conversations");
    assert!(!body.to_string().contains("connection refused"));
}

#[test]
fn not_found_maps_to_fixed_message() {
    let err = conversation_error(ConversationError::NotFound(Uuid::nil()), "ctx");
    assert_eq!(err, ApiError::NotFound(CONVERSATION_NOT_FOUND));
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[test]
fn invalid_arguments_are_bad_requests() {
    for err in [
        ConversationError::InvalidLimit(0),
        ConversationError::InvalidOffset(-3),
        ConversationError::InvalidCursor(CursorError::Malformed("x".into())),
    ] {
        assert_eq!(conversation_error(err, "ctx").status(), StatusCode::BAD_REQUEST);
    }
}

#[test]
fn database_errors_use_context_message() {
    let cause = ConversationError::Database(sqlx::Error::RowNotFound);
    let err = conversation_error(cause, "Failed to list conversations");
    assert_eq!(err, ApiError::Internal("Failed to list conversations"));
}

#[test]
fn chat_not_configured_is_503() {
    let err = chat_error(ChatError::NotConfigured);
    assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.message(), "AI chat is not configured");
}

#[test]
fn chat_empty_message_is_400() {
    assert_eq!(chat_error(ChatError::EmptyMessage).status(), StatusCode::BAD_REQUEST);
}

#[test]
fn chat_foreign_conversation_is_404() {
    let err = chat_error(ChatError::Conversation(ConversationError::NotFound(Uuid::nil())));
    assert_eq!(err, ApiError::NotFound(CONVERSATION_NOT_FOUND));
}
