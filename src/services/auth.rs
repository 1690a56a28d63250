//! Google OAuth service: code exchange, profile fetch, user upsert.

use reqwest::Url;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";
pub const GOOGLE_PROVIDER_ID: &str = "google";

/// Google OAuth configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl GoogleConfig {
    /// Load from `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URI`.
    /// Returns `None` if any are missing (auth will be disabled).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok()?;
        let redirect_uri = std::env::var("GOOGLE_REDIRECT_URI").ok()?;
        Some(Self { client_id, client_secret, redirect_uri })
    }

    /// Build the Google consent-screen URL carrying the CSRF `state`.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", GOOGLE_SCOPES),
            ("state", state),
            ("prompt", "select_account"),
        ];
        match Url::parse_with_params(GOOGLE_AUTHORIZE_URL, &params) {
            Ok(url) => url.into(),
            Err(_) => GOOGLE_AUTHORIZE_URL.to_string(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Profile returned by Google's `OpenID` userinfo endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GoogleUser {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleUser {
    /// Display name, falling back to the email's local part.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("google token exchange failed: {0}")]
    TokenExchange(String),
    #[error("google api error: {0}")]
    GoogleApi(String),
    #[error("google profile has no email")]
    MissingEmail,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Exchange an OAuth code for an access token.
///
/// # Errors
///
/// Returns [`AuthError::TokenExchange`] if Google rejects the code.
pub async fn exchange_code(config: &GoogleConfig, code: &str) -> Result<String, AuthError> {
    let client = reqwest::Client::new();
    let resp = client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
    if !status.is_success() {
        return Err(AuthError::TokenExchange(format!("{status}: {body}")));
    }
    let token_resp: TokenResponse = serde_json::from_str(&body)
        .map_err(|_| AuthError::TokenExchange(format!("unexpected response: {body}")))?;
    Ok(token_resp.access_token)
}

/// Fetch the signed-in Google user's profile.
///
/// # Errors
///
/// Returns [`AuthError::GoogleApi`] on a transport error or non-success status.
pub async fn fetch_google_user(access_token: &str) -> Result<GoogleUser, AuthError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AuthError::GoogleApi(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::GoogleApi(format!("{status}: {body}")));
    }

    resp.json::<GoogleUser>()
        .await
        .map_err(|e| AuthError::GoogleApi(e.to_string()))
}

/// Upsert a user and their Google account link. Returns the user's UUID.
///
/// Users are keyed by email, so signing in again refreshes the profile.
///
/// # Errors
///
/// Returns [`AuthError::MissingEmail`] when Google returned no email.
pub async fn upsert_user(pool: &PgPool, google: &GoogleUser) -> Result<Uuid, AuthError> {
    let email = google
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or(AuthError::MissingEmail)?;

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        r"INSERT INTO users (name, email, email_verified, image)
          VALUES ($1, $2, $3, $4)
          ON CONFLICT (email) DO UPDATE
          SET name = EXCLUDED.name,
              email_verified = users.email_verified OR EXCLUDED.email_verified,
              image = EXCLUDED.image,
              updated_at = now()
          RETURNING id",
    )
    .bind(google.display_name())
    .bind(email)
    .bind(google.email_verified)
    .bind(&google.picture)
    .fetch_one(&mut *tx)
    .await?;
    let user_id: Uuid = row.get("id");

    sqlx::query(
        r"INSERT INTO accounts (user_id, provider_id, account_id)
          VALUES ($1, $2, $3)
          ON CONFLICT (provider_id, account_id) DO UPDATE
          SET user_id = EXCLUDED.user_id, updated_at = now()",
    )
    .bind(user_id)
    .bind(GOOGLE_PROVIDER_ID)
    .bind(&google.sub)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(user_id)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
