//! Shared conversation-list model for the chat server and its clients.
//!
//! This crate owns the wire representation of conversations and messages as
//! returned by the HTTP API, the page cursor format used by the paginated
//! list endpoint, and the client-side pieces that turn a stream of pages into
//! the date-grouped sidebar (see [`bucket`] and [`feed`]). [`sse`] decodes
//! the event streams used for streamed chat replies.

pub mod bucket;
pub mod cursor;
pub mod feed;
pub mod sse;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use bucket::{Dated, Period, PeriodGroup, group_by_period, group_by_period_local};
pub use cursor::{CursorError, format_cursor, parse_cursor, split_overfetched};
pub use feed::{ConversationFeed, FeedRequest};
pub use sse::{SseDecoder, SseEvent};

/// Title shown for conversations that were never given one.
pub const UNTITLED: &str = "Untitled";

// =============================================================================
// ROLE
// =============================================================================

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role string is not one of `user`, `assistant`, `system`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown message role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(ParseRoleError(other.to_owned())),
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A conversation row. `updated_at` moves forward whenever a message is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub title: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Title for display, falling back to [`UNTITLED`].
    #[must_use]
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => UNTITLED,
        }
    }
}

/// A single chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A conversation together with some of its messages.
///
/// List pages carry at most the latest message (preview); a single
/// conversation fetch carries the full history in ascending order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ConversationWithMessages {
    /// Most recent message, if the row carries one.
    #[must_use]
    pub fn preview(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// One page of the conversation list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPage {
    pub conversations: Vec<ConversationWithMessages>,
    /// Cursor for the following page; `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

impl ConversationPage {
    #[must_use]
    pub fn empty() -> Self {
        Self { conversations: Vec::new(), next_cursor: None }
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
