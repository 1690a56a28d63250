//! Client-side accumulator for the paginated conversation list.
//!
//! Mirrors how the sidebar consumes the list endpoint: ask for a page, keep
//! it, follow `next_cursor` until the server stops returning one, then group
//! everything fetched so far. Mutations must call [`ConversationFeed::invalidate`]
//! explicitly; nothing is refreshed behind the caller's back.

use chrono::{DateTime, TimeZone};
use uuid::Uuid;

use crate::bucket::{PeriodGroup, group_by_period};
use crate::{ConversationPage, ConversationWithMessages};

/// Page request the feed wants next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedRequest {
    /// First page, newest conversations.
    Start,
    /// Page strictly older than this cursor.
    After(String),
}

impl FeedRequest {
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        match self {
            Self::Start => None,
            Self::After(cursor) => Some(cursor),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Position {
    Fresh,
    More(String),
    Exhausted,
}

/// Accumulated pages of the conversation list.
#[derive(Clone, Debug)]
pub struct ConversationFeed {
    pages: Vec<ConversationPage>,
    position: Position,
}

impl Default for ConversationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationFeed {
    #[must_use]
    pub fn new() -> Self {
        Self { pages: Vec::new(), position: Position::Fresh }
    }

    /// The next page to fetch, or `None` once the list is exhausted.
    #[must_use]
    pub fn next_request(&self) -> Option<FeedRequest> {
        match &self.position {
            Position::Fresh => Some(FeedRequest::Start),
            Position::More(cursor) => Some(FeedRequest::After(cursor.clone())),
            Position::Exhausted => None,
        }
    }

    #[must_use]
    pub fn has_next_page(&self) -> bool {
        self.position != Position::Exhausted
    }

    /// Record a fetched page.
    ///
    /// A page whose cursor repeats the one just followed would loop forever,
    /// so it is treated as the end of the list.
    pub fn push_page(&mut self, page: ConversationPage) {
        self.position = match (&self.position, page.next_cursor.as_deref()) {
            (_, None) => Position::Exhausted,
            (Position::More(previous), Some(next)) if previous == next => Position::Exhausted,
            (_, Some(next)) => Position::More(next.to_owned()),
        };
        self.pages.push(page);
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.conversations.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All fetched conversations, flattened in page order.
    pub fn conversations(&self) -> impl Iterator<Item = &ConversationWithMessages> {
        self.pages.iter().flat_map(|page| page.conversations.iter())
    }

    #[must_use]
    pub fn find(&self, id: Uuid) -> Option<&ConversationWithMessages> {
        self.conversations().find(|item| item.conversation.id == id)
    }

    /// Group everything fetched so far by recency relative to `now`.
    pub fn groups<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Vec<PeriodGroup<&ConversationWithMessages>> {
        group_by_period(self.conversations(), now)
    }

    /// Drop every fetched page and start over from the newest conversation.
    pub fn invalidate(&mut self) {
        self.pages.clear();
        self.position = Position::Fresh;
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
