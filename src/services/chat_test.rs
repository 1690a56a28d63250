use super::*;
use crate::state::test_helpers::{MockLlm, test_app_state, test_app_state_with_llm};

fn request() -> ChatRequest {
    ChatRequest {
        model: ModelKind::Chat,
        system: None,
        messages: vec![Message::new(Role::User, "hello")],
        max_tokens: 64,
        temperature: None,
    }
}

fn complete(text: &str) -> Option<Reply> {
    Some(Reply { text: text.into(), truncated: false })
}

async fn drain(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// =============================================================================
// start_chat: argument checks before any database access
// =============================================================================

#[tokio::test]
async fn start_chat_without_llm_is_not_configured() {
    let state = test_app_state();
    let err = start_chat(&state, Uuid::new_v4(), Uuid::new_v4(), "hi").await.unwrap_err();
    assert!(matches!(err, ChatError::NotConfigured));
    assert_eq!(err.to_string(), "AI chat is not configured");
}

#[tokio::test]
async fn start_chat_rejects_blank_content() {
    let state = test_app_state_with_llm(Arc::new(MockLlm::streaming(&["x"])));
    let err = start_chat(&state, Uuid::new_v4(), Uuid::new_v4(), " \n\t ").await.unwrap_err();
    assert!(matches!(err, ChatError::EmptyMessage));
}

// =============================================================================
// collect_reply
// =============================================================================

#[tokio::test]
async fn collect_reply_forwards_deltas_and_returns_text() {
    let llm = Arc::new(MockLlm::streaming(&["Hel", "lo", "!"]));
    let (tx, rx) = mpsc::channel(16);

    let reply = collect_reply(llm.clone(), request(), &tx).await;
    drop(tx);

    assert_eq!(reply, complete("Hello!"));
    assert_eq!(
        drain(rx).await,
        vec![
            ChatEvent::Delta("Hel".into()),
            ChatEvent::Delta("lo".into()),
            ChatEvent::Delta("!".into()),
        ]
    );
    assert_eq!(llm.requests()[0].messages, request().messages);
}

#[tokio::test]
async fn collect_reply_keeps_going_after_client_leaves() {
    let llm = Arc::new(MockLlm::streaming(&["a", "b", "c"]));
    let (tx, rx) = mpsc::channel(16);
    drop(rx);

    let reply = collect_reply(llm, request(), &tx).await;
    assert_eq!(reply, complete("abc"));
}

#[tokio::test]
async fn collect_reply_without_text_sends_error() {
    let llm = Arc::new(MockLlm::failing("upstream down"));
    let (tx, rx) = mpsc::channel(16);

    let reply = collect_reply(llm, request(), &tx).await;
    drop(tx);

    assert_eq!(reply, None);
    assert_eq!(drain(rx).await, vec![ChatEvent::Error("Failed to generate a reply".into())]);
}

#[tokio::test]
async fn collect_reply_marks_partial_text_truncated_on_midstream_failure() {
    let llm =
        Arc::new(MockLlm::streaming(&["partial ", "answer"]).then_failing("connection reset"));
    let (tx, rx) = mpsc::channel(16);

    let reply = collect_reply(llm, request(), &tx).await;
    drop(tx);

    assert_eq!(reply, Some(Reply { text: "partial answer".into(), truncated: true }));
    let events = drain(rx).await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, ChatEvent::Delta(_))));
}

#[tokio::test]
async fn collect_reply_empty_stream_is_error() {
    let llm = Arc::new(MockLlm::streaming(&[]));
    let (tx, rx) = mpsc::channel(16);

    assert_eq!(collect_reply(llm, request(), &tx).await, None);
    drop(tx);
    assert_eq!(drain(rx).await, vec![ChatEvent::Error("Failed to generate a reply".into())]);
}

#[test]
fn complete_reply_is_stored_without_metadata() {
    let message = Reply { text: "Hi".into(), truncated: false }.into_message();
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content, "Hi");
    assert!(message.metadata.is_none());
}

#[test]
fn truncated_reply_is_stored_with_marker() {
    let message = Reply { text: "Hi th".into(), truncated: true }.into_message();
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content, "Hi th");
    assert_eq!(message.metadata, Some(serde_json::json!({ "truncated": true })));
}

// =============================================================================
// live database
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::state::test_helpers::{integration_pool, seed_user};

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn chat_persists_both_sides_and_titles_new_conversation() {
        let pool = integration_pool().await;
        let user_id = seed_user(&pool).await;
        let mut state = AppState::new(pool.clone(), None, None);
        state.llm = Some(Arc::new(MockLlm::streaming(&["Hi ", "there"])));
        let conversation_id = Uuid::new_v4();

        let rx = start_chat(&state, user_id, conversation_id, "  hello  ").await.unwrap();
        let events = drain(rx).await;
        let Some(ChatEvent::Done { message_id }) = events.last().cloned() else {
            panic!("expected done event, got {events:?}");
        };

        let full = conversation::get_conversation(&pool, user_id, conversation_id).await.unwrap();
        let turns: Vec<(Role, &str)> =
            full.messages.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(turns, [(Role::User, "hello"), (Role::Assistant, "Hi there")]);
        assert_eq!(full.messages[1].id, message_id);

        // Title task runs in the background.
        for _ in 0..50 {
            let current =
                conversation::get_conversation(&pool, user_id, conversation_id).await.unwrap();
            if current.conversation.title.is_some() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("title was never assigned");
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn chat_on_foreign_conversation_is_not_found() {
        let pool = integration_pool().await;
        let owner = seed_user(&pool).await;
        let intruder = seed_user(&pool).await;
        let conversation =
            conversation::create_conversation(&pool, owner, None, None).await.unwrap();
        let mut state = AppState::new(pool, None, None);
        state.llm = Some(Arc::new(MockLlm::streaming(&["x"])));

        let err = start_chat(&state, intruder, conversation.id, "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Conversation(ConversationError::NotFound(_))));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn partial_reply_is_stored_as_truncated() {
        let pool = integration_pool().await;
        let user_id = seed_user(&pool).await;
        let conversation =
            conversation::create_conversation(&pool, user_id, None, Some("Set")).await.unwrap();
        let mut state = AppState::new(pool.clone(), None, None);
        state.llm = Some(Arc::new(MockLlm::streaming(&["par"]).then_failing("reset")));

        let rx = start_chat(&state, user_id, conversation.id, "hello").await.unwrap();
        let events = drain(rx).await;
        assert!(matches!(events.last(), Some(ChatEvent::Done { .. })), "{events:?}");

        let full = conversation::get_conversation(&pool, user_id, conversation.id).await.unwrap();
        let reply = &full.messages[1];
        assert_eq!(reply.content, "par");
        assert_eq!(reply.metadata, Some(serde_json::json!({ "truncated": true })));
    }
}
