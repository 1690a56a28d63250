//! Auth routes: Google OAuth flow and session management.

use axum::extract::{FromRef, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;

use super::error::ApiError;
use crate::services::{auth as auth_svc, session};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";
const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn cookie_secure() -> bool {
    if let Some(value) = env_bool("COOKIE_SECURE") {
        return value;
    }

    std::env::var("GOOGLE_REDIRECT_URI")
        .map(|uri| uri.starts_with("https://"))
        .unwrap_or(false)
}

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new(), secure);
    cookie.set_max_age(Duration::ZERO);
    cookie
}

/// Client address and agent recorded with a new session.
pub(crate) fn client_info(headers: &HeaderMap) -> session::ClientInfo {
    let header_str = |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let ip_address = header_str(header::HeaderName::from_static("x-forwarded-for"))
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(header::HeaderName::from_static("x-real-ip")))
        .map(str::to_owned);
    let user_agent = header_str(header::USER_AGENT).map(str::to_owned);
    session::ClientInfo { ip_address, user_agent }
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(ApiError::Unauthorized);
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, token)
            .await
            .map_err(|e| ApiError::internal("Failed to validate session", e))?
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self { user, token: token.to_owned() })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /auth/google`: redirect to the Google consent screen.
pub async fn google_redirect(State(state): State<AppState>) -> Response {
    let Some(config) = &state.google else {
        return ApiError::ServiceUnavailable("Google sign-in is not configured").into_response();
    };

    let oauth_state = session::generate_token();
    let mut cookie = base_cookie(OAUTH_STATE_COOKIE_NAME, oauth_state.clone(), cookie_secure());
    cookie.set_max_age(Duration::minutes(OAUTH_STATE_TTL_MINUTES));

    let jar = CookieJar::new().add(cookie);
    (jar, Redirect::temporary(&config.authorize_url(&oauth_state))).into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// `GET /auth/google/callback`: exchange code, upsert user, set cookie, redirect to `/`.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let Some(config) = &state.google else {
        return Err(ApiError::ServiceUnavailable("Google sign-in is not configured"));
    };
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(%error, "google sign-in declined");
        return Err(ApiError::BadRequest("Google sign-in was cancelled".into()));
    }
    let secure = cookie_secure();

    // Verify OAuth CSRF state from cookie.
    let Some(callback_state) = params.state.as_deref() else {
        return Err(ApiError::BadRequest("missing oauth state".into()));
    };
    let expected_state = jar
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(Cookie::value)
        .unwrap_or_default();
    if expected_state.is_empty() || expected_state != callback_state {
        return Err(ApiError::Unauthorized);
    }
    let Some(code) = params.code.as_deref() else {
        return Err(ApiError::BadRequest("missing oauth code".into()));
    };

    let access_token = auth_svc::exchange_code(config, code).await.map_err(|e| {
        tracing::error!(error = %e, "oauth code exchange failed");
        ApiError::BadGateway("OAuth code exchange failed")
    })?;

    let google_user = auth_svc::fetch_google_user(&access_token).await.map_err(|e| {
        tracing::error!(error = %e, "google user fetch failed");
        ApiError::BadGateway("Failed to fetch Google profile")
    })?;

    let user_id = auth_svc::upsert_user(&state.pool, &google_user)
        .await
        .map_err(|e| match e {
            auth_svc::AuthError::MissingEmail => {
                ApiError::BadRequest("Google account has no email".into())
            }
            other => ApiError::internal("Failed to create user", other),
        })?;

    let token = session::create_session(&state.pool, user_id, &client_info(&headers))
        .await
        .map_err(|e| ApiError::internal("Failed to create session", e))?;
    tracing::info!(%user_id, "signed in with google");

    let jar = jar
        .add(base_cookie(COOKIE_NAME, token, secure))
        .add(expired_cookie(OAUTH_STATE_COOKIE_NAME, secure));
    Ok((jar, Redirect::temporary("/")).into_response())
}

/// `GET /api/auth/me`: return current user.
pub async fn me(auth: AuthUser) -> Json<session::SessionUser> {
    Json(auth.user)
}

/// `POST /api/auth/logout`: delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(e) = session::delete_session(&state.pool, &auth.token).await {
        tracing::warn!(error = %e, "session delete failed during logout");
    }

    let jar = CookieJar::new().add(expired_cookie(COOKIE_NAME, cookie_secure()));
    (jar, StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
