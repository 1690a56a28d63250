//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Auth endpoints sit at the root (`/auth/google*`) because the OAuth
//! provider redirects the browser there. Everything under `/api` except
//! health requires a session cookie, enforced per handler by the
//! [`auth::AuthUser`] extractor.

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/google", get(auth::google_redirect))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(conversations::get_conversation)
                .patch(conversations::update_conversation)
                .delete(conversations::delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversations::list_messages).post(conversations::add_message),
        )
        .route("/api/chat", post(chat::chat))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
