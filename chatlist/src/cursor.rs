//! Page cursor for the conversation list.
//!
//! A cursor is the `updated_at` of the last row of the previous page,
//! rendered as RFC 3339 UTC. Microsecond precision matches the Postgres
//! `timestamptz` column, so a cursor never rounds past a stored value.

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is empty")]
    Empty,
    #[error("cursor is not an ISO-8601 timestamp: {0}")]
    Malformed(String),
}

/// Render a timestamp as a page cursor.
#[must_use]
pub fn format_cursor(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a page cursor. Any RFC 3339 offset is accepted and normalized to UTC.
///
/// # Errors
///
/// Returns [`CursorError`] if the string is blank or not a timestamp.
pub fn parse_cursor(raw: &str) -> Result<DateTime<Utc>, CursorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CursorError::Empty);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| CursorError::Malformed(trimmed.to_owned()))
}

/// Trim an over-fetched result set to `limit` rows and derive the next cursor.
///
/// Callers query `limit + 1` rows. When the extra row is present it is
/// dropped and the cursor points at the last retained row; otherwise the
/// listing is exhausted and no cursor is returned.
pub fn split_overfetched<T>(
    mut rows: Vec<T>,
    limit: usize,
    updated_at: impl Fn(&T) -> DateTime<Utc>,
) -> (Vec<T>, Option<String>) {
    if rows.len() <= limit {
        return (rows, None);
    }
    rows.truncate(limit);
    let next = rows.last().map(|row| format_cursor(updated_at(row)));
    (rows, next)
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod tests;
