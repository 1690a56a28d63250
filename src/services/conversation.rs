//! Conversation service: paginated listing, CRUD, and message history.
//!
//! DESIGN
//! ======
//! Every operation takes the caller's user id and checks ownership first; a
//! conversation owned by someone else is indistinguishable from a missing
//! one (`NotFound`).
//!
//! PAGINATION
//! ==========
//! The list is keyset-paginated on `updated_at` alone. A page asks for
//! `limit + 1` rows ordered `updated_at DESC, id DESC`; the extra row only
//! signals that another page exists and is dropped before returning. The
//! next cursor is the `updated_at` of the last kept row and the following
//! page filters `updated_at < cursor`. Rows sharing an `updated_at` that
//! straddle a page edge are skipped by the strict comparison; with
//! microsecond timestamps this is accepted.
//!
//! Appending a message bumps `updated_at`, so a conversation can move
//! between pages while a client is paging. Each page is one independent
//! read; no snapshot is held across calls.

use chatlist::{
    Conversation, ConversationPage, ConversationWithMessages, CursorError, Message, Role,
    parse_cursor, split_overfetched,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;
pub const DEFAULT_MESSAGE_LIMIT: i64 = 100;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("conversation not found: {0}")]
    NotFound(Uuid),
    #[error("invalid limit: {0}")]
    InvalidLimit(i64),
    #[error("invalid offset: {0}")]
    InvalidOffset(i64),
    #[error(transparent)]
    InvalidCursor(#[from] CursorError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Raw list parameters as they arrive from a request.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Validated list parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub search: Option<String>,
    pub cursor: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl ListQuery {
    /// Validate and normalize: an empty search means no filter, the limit
    /// defaults to [`DEFAULT_PAGE_LIMIT`] and is capped at [`MAX_PAGE_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::InvalidLimit`] for a non-positive limit
    /// and [`ConversationError::InvalidCursor`] for an unparseable cursor.
    pub fn validate(self) -> Result<PageRequest, ConversationError> {
        let limit = match self.limit {
            None => DEFAULT_PAGE_LIMIT,
            Some(n) if n <= 0 => return Err(ConversationError::InvalidLimit(n)),
            Some(n) => n.min(MAX_PAGE_LIMIT),
        };
        let cursor = self.cursor.as_deref().map(parse_cursor).transpose()?;
        let search = self.search.filter(|s| !s.is_empty());

        Ok(PageRequest { search, cursor, limit: usize::try_from(limit).unwrap_or(usize::MAX) })
    }
}

/// A message to append.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub metadata: Option<Value>,
}

impl NewMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), metadata: None }
    }
}

/// Escape `%`, `_` and `\` so a search term matches literally inside `ILIKE`.
#[must_use]
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

// =============================================================================
// LIST
// =============================================================================

/// One page of the caller's conversations, newest first, each with at most
/// its latest message as a preview.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_conversations(
    pool: &PgPool,
    user_id: Uuid,
    page: &PageRequest,
) -> Result<ConversationPage, ConversationError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT c.id, c.title, c.user_id, c.created_at, c.updated_at,
                m.id AS message_id, m.role AS message_role, m.content AS message_content,
                m.metadata AS message_metadata, m.created_at AS message_created_at
         FROM conversations c
         LEFT JOIN LATERAL (
             SELECT id, role, content, metadata, created_at
             FROM messages
             WHERE conversation_id = c.id
             ORDER BY created_at DESC, id DESC
             LIMIT 1
         ) m ON true
         WHERE c.user_id = ",
    );
    builder.push_bind(user_id);
    if let Some(search) = &page.search {
        // Backslash is the default LIKE escape character.
        builder.push(" AND c.title ILIKE ");
        builder.push_bind(like_pattern(search));
    }
    if let Some(cursor) = page.cursor {
        builder.push(" AND c.updated_at < ");
        builder.push_bind(cursor);
    }
    builder.push(" ORDER BY c.updated_at DESC, c.id DESC LIMIT ");
    builder.push_bind(i64::try_from(page.limit).unwrap_or(MAX_PAGE_LIMIT) + 1);

    let rows = builder.build().fetch_all(pool).await?;
    let items = rows
        .iter()
        .map(list_item_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let (conversations, next_cursor) =
        split_overfetched(items, page.limit, |c| c.conversation.updated_at);
    Ok(ConversationPage { conversations, next_cursor })
}

fn list_item_from_row(row: &PgRow) -> Result<ConversationWithMessages, sqlx::Error> {
    let conversation = conversation_from_row(row)?;
    let preview = match row.try_get::<Option<Uuid>, _>("message_id")? {
        Some(id) => vec![Message {
            id,
            conversation_id: conversation.id,
            role: decode_role(row.try_get("message_role")?)?,
            content: row.try_get("message_content")?,
            metadata: row.try_get("message_metadata")?,
            created_at: row.try_get("message_created_at")?,
        }],
        None => Vec::new(),
    };
    Ok(ConversationWithMessages { conversation, messages: preview })
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a conversation for `user_id`. A caller-chosen id is used as-is.
///
/// # Errors
///
/// Returns a database error if the insert fails (including an id clash).
pub async fn create_conversation(
    pool: &PgPool,
    user_id: Uuid,
    id: Option<Uuid>,
    title: Option<&str>,
) -> Result<Conversation, ConversationError> {
    let id = id.unwrap_or_else(Uuid::new_v4);
    let row = sqlx::query(
        "INSERT INTO conversations (id, title, user_id)
         VALUES ($1, $2, $3)
         RETURNING id, title, user_id, created_at, updated_at",
    )
    .bind(id)
    .bind(title)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    info!(%id, %user_id, "conversation created");
    Ok(conversation_from_row(&row)?)
}

/// Return the caller's conversation with `id`, creating it when absent.
///
/// The boolean is `true` when this call created the row.
///
/// # Errors
///
/// Returns [`ConversationError::NotFound`] if the id belongs to another user.
pub async fn ensure_conversation(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<(Conversation, bool), ConversationError> {
    let inserted = sqlx::query(
        "INSERT INTO conversations (id, user_id)
         VALUES ($1, $2)
         ON CONFLICT (id) DO NOTHING
         RETURNING id, title, user_id, created_at, updated_at",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = inserted {
        info!(%id, %user_id, "conversation created for chat");
        return Ok((conversation_from_row(&row)?, true));
    }
    Ok((owned_conversation(pool, user_id, id).await?, false))
}

/// Fetch a conversation with its full history, oldest message first.
///
/// # Errors
///
/// Returns [`ConversationError::NotFound`] if missing or not owned.
pub async fn get_conversation(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<ConversationWithMessages, ConversationError> {
    let conversation = owned_conversation(pool, user_id, id).await?;
    let messages = history(pool, id).await?;
    Ok(ConversationWithMessages { conversation, messages })
}

/// Rename a conversation.
///
/// # Errors
///
/// Returns [`ConversationError::NotFound`] if missing or not owned.
pub async fn update_title(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    title: &str,
) -> Result<Conversation, ConversationError> {
    let row = sqlx::query(
        "UPDATE conversations
         SET title = $3, updated_at = GREATEST(now(), updated_at)
         WHERE id = $1 AND user_id = $2
         RETURNING id, title, user_id, created_at, updated_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(title)
    .fetch_optional(pool)
    .await?
    .ok_or(ConversationError::NotFound(id))?;

    Ok(conversation_from_row(&row)?)
}

/// Set a title only if the conversation still has none. Returns whether it was set.
///
/// Unlike [`update_title`] this leaves `updated_at` alone: a generated title
/// is not user activity and must not reorder the list.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn set_title_if_missing(
    pool: &PgPool,
    id: Uuid,
    title: &str,
) -> Result<bool, ConversationError> {
    let result = sqlx::query("UPDATE conversations SET title = $2 WHERE id = $1 AND title IS NULL")
        .bind(id)
        .bind(title)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a conversation and, by cascade, its messages.
///
/// # Errors
///
/// Returns [`ConversationError::NotFound`] if missing or not owned.
pub async fn delete_conversation(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<(), ConversationError> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ConversationError::NotFound(id));
    }
    info!(%id, %user_id, "conversation deleted");
    Ok(())
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Append a message and bump the conversation's `updated_at`, atomically.
///
/// # Errors
///
/// Returns [`ConversationError::NotFound`] if missing or not owned.
pub async fn add_message(
    pool: &PgPool,
    user_id: Uuid,
    conversation_id: Uuid,
    message: NewMessage,
) -> Result<Message, ConversationError> {
    let mut tx = pool.begin().await?;

    // Row lock keeps a concurrent delete from racing the insert.
    let owned =
        sqlx::query("SELECT id FROM conversations WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(conversation_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    if owned.is_none() {
        return Err(ConversationError::NotFound(conversation_id));
    }

    let row = sqlx::query(
        "INSERT INTO messages (id, conversation_id, role, content, metadata)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, conversation_id, role, content, metadata, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(&message.metadata)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = GREATEST(now(), updated_at) WHERE id = $1")
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(message_from_row(&row)?)
}

/// Page through a conversation's messages, oldest first.
///
/// # Errors
///
/// Returns [`ConversationError::NotFound`] if missing or not owned, or an
/// invalid-argument error for a non-positive limit or negative offset.
pub async fn list_messages(
    pool: &PgPool,
    user_id: Uuid,
    conversation_id: Uuid,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<Message>, ConversationError> {
    let limit = match limit {
        None => DEFAULT_MESSAGE_LIMIT,
        Some(n) if n <= 0 => return Err(ConversationError::InvalidLimit(n)),
        Some(n) => n,
    };
    let offset = match offset {
        None => 0,
        Some(n) if n < 0 => return Err(ConversationError::InvalidOffset(n)),
        Some(n) => n,
    };

    owned_conversation(pool, user_id, conversation_id).await?;

    let rows = sqlx::query(
        "SELECT id, conversation_id, role, content, metadata, created_at
         FROM messages
         WHERE conversation_id = $1
         ORDER BY created_at ASC, id ASC
         LIMIT $2 OFFSET $3",
    )
    .bind(conversation_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(message_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

/// Full history of a conversation, oldest first. Callers check ownership.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn history(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Vec<Message>, ConversationError> {
    let rows = sqlx::query(
        "SELECT id, conversation_id, role, content, metadata, created_at
         FROM messages
         WHERE conversation_id = $1
         ORDER BY created_at ASC, id ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(message_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

// =============================================================================
// ROW MAPPING
// =============================================================================

async fn owned_conversation(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Conversation, ConversationError> {
    let row = sqlx::query(
        "SELECT id, title, user_id, created_at, updated_at
         FROM conversations
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ConversationError::NotFound(id))?;
    Ok(conversation_from_row(&row)?)
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation, sqlx::Error> {
    Ok(Conversation {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        role: decode_role(row.try_get("role")?)?,
        content: row.try_get("content")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_role(raw: String) -> Result<Role, sqlx::Error> {
    raw.parse::<Role>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
