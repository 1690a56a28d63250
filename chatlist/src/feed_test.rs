use super::*;
use crate::bucket::Period;
use crate::{Conversation, format_cursor};
use chrono::Utc;

fn item(title: &str, updated_at: &str) -> ConversationWithMessages {
    let ts = DateTime::parse_from_rfc3339(updated_at)
        .expect("timestamp")
        .with_timezone(&Utc);
    ConversationWithMessages {
        conversation: Conversation {
            id: Uuid::new_v4(),
            title: Some(title.to_owned()),
            user_id: Uuid::nil(),
            created_at: ts,
            updated_at: ts,
        },
        messages: Vec::new(),
    }
}

fn page(items: Vec<ConversationWithMessages>, more: bool) -> ConversationPage {
    let next_cursor = if more {
        items.last().map(|last| format_cursor(last.conversation.updated_at))
    } else {
        None
    };
    ConversationPage { conversations: items, next_cursor }
}

fn two_recent() -> Vec<ConversationWithMessages> {
    vec![item("a", "2026-03-15T12:00:00Z"), item("b", "2026-03-15T11:00:00Z")]
}

#[test]
fn new_feed_requests_first_page() {
    let feed = ConversationFeed::new();
    assert_eq!(feed.next_request(), Some(FeedRequest::Start));
    assert!(feed.has_next_page());
    assert!(feed.is_empty());
    assert_eq!(FeedRequest::Start.cursor(), None);
}

#[test]
fn follows_next_cursor_until_exhausted() {
    let mut feed = ConversationFeed::new();
    let first = page(two_recent(), true);
    let expected_cursor = first.next_cursor.clone().unwrap();
    feed.push_page(first);
    assert_eq!(feed.next_request(), Some(FeedRequest::After(expected_cursor.clone())));
    assert_eq!(feed.next_request().unwrap().cursor(), Some(expected_cursor.as_str()));

    feed.push_page(page(vec![item("c", "2026-03-10T11:00:00Z")], false));
    assert_eq!(feed.next_request(), None);
    assert!(!feed.has_next_page());
    assert_eq!(feed.page_count(), 2);
    assert_eq!(feed.len(), 3);
}

#[test]
fn conversations_flatten_in_page_order() {
    let mut feed = ConversationFeed::new();
    feed.push_page(page(two_recent(), true));
    feed.push_page(page(vec![item("c", "2026-03-01T11:00:00Z")], false));
    let titles: Vec<&str> = feed
        .conversations()
        .map(|c| c.conversation.display_title())
        .collect();
    assert_eq!(titles, ["a", "b", "c"]);
}

#[test]
fn repeated_cursor_ends_the_feed() {
    let mut feed = ConversationFeed::new();
    let first = page(vec![item("a", "2026-03-15T12:00:00Z")], true);
    let repeated = first.clone();
    feed.push_page(first);
    feed.push_page(repeated);
    assert_eq!(feed.next_request(), None);
}

#[test]
fn empty_first_page_exhausts_feed() {
    let mut feed = ConversationFeed::new();
    feed.push_page(ConversationPage::empty());
    assert_eq!(feed.next_request(), None);
    assert!(feed.groups(&Utc::now()).is_empty());
}

#[test]
fn groups_cover_all_pages() {
    let now = DateTime::parse_from_rfc3339("2026-03-15T14:00:00Z").unwrap();
    let mut feed = ConversationFeed::new();
    feed.push_page(page(vec![item("today", "2026-03-15T12:00:00Z")], true));
    feed.push_page(page(vec![item("old", "2025-01-15T12:00:00Z")], false));
    let groups = feed.groups(&now);
    let periods: Vec<Period> = groups.iter().map(|g| g.period).collect();
    assert_eq!(periods, [Period::Today, Period::Older]);
    assert_eq!(groups[1].conversations[0].conversation.display_title(), "old");
}

#[test]
fn invalidate_resets_to_first_page() {
    let mut feed = ConversationFeed::new();
    feed.push_page(page(vec![item("a", "2026-03-15T12:00:00Z")], false));
    assert_eq!(feed.next_request(), None);

    feed.invalidate();
    assert_eq!(feed.next_request(), Some(FeedRequest::Start));
    assert_eq!(feed.page_count(), 0);
    assert!(feed.is_empty());
}

#[test]
fn find_locates_fetched_conversation() {
    let mut feed = ConversationFeed::new();
    let target = item("target", "2026-03-15T12:00:00Z");
    let id = target.conversation.id;
    feed.push_page(page(vec![item("other", "2026-03-15T13:00:00Z"), target], false));
    assert_eq!(feed.find(id).map(|c| c.conversation.display_title()), Some("target"));
    assert!(feed.find(Uuid::new_v4()).is_none());
}
