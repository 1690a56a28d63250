//! Session management.
//!
//! ARCHITECTURE
//! ============
//! Browser auth uses an opaque random token stored in an HttpOnly cookie.
//! The token is the primary key of the `sessions` row; a session stops
//! authenticating once `expires_at` passes, and logout deletes the row.

use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Lifetime of a freshly created session.
pub const SESSION_TTL_DAYS: i64 = 7;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Expiry instant for a session created at `now`.
#[must_use]
pub fn session_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(SESSION_TTL_DAYS)
}

/// User row returned from session validation.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Avatar image URL, if the provider supplied one.
    pub image: Option<String>,
}

/// Request details recorded alongside a session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Create a session for the given user, returning the token.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    client: &ClientInfo,
) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query(
        "INSERT INTO sessions (token, user_id, expires_at, ip_address, user_agent)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&token)
    .bind(user_id)
    .bind(session_expiry(Utc::now()))
    .bind(&client.ip_address)
    .bind(&client.user_agent)
    .execute(pool)
    .await?;
    Ok(token)
}

/// Validate a session token and return the associated user.
///
/// # Errors
///
/// Returns a database error if the lookup fails.
pub async fn validate_session(
    pool: &PgPool,
    token: &str,
) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT u.id, u.name, u.email, u.image
          FROM sessions s
          JOIN users u ON u.id = s.user_id
          WHERE s.token = $1 AND s.expires_at > now()",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser {
        id: r.get("id"),
        name: r.get("name"),
        email: r.get("email"),
        image: r.get("image"),
    }))
}

/// Delete a session by token.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired sessions, returning how many were deleted.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn purge_expired_sessions(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
