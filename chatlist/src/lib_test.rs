use super::*;

fn sample_conversation(title: Option<&str>) -> Conversation {
    let ts = DateTime::parse_from_rfc3339("2026-03-15T12:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc);
    Conversation {
        id: Uuid::nil(),
        title: title.map(str::to_owned),
        user_id: Uuid::nil(),
        created_at: ts,
        updated_at: ts,
    }
}

// =============================================================================
// Role
// =============================================================================

#[test]
fn role_parses_known_values() {
    assert_eq!("user".parse::<Role>(), Ok(Role::User));
    assert_eq!("assistant".parse::<Role>(), Ok(Role::Assistant));
    assert_eq!("system".parse::<Role>(), Ok(Role::System));
}

#[test]
fn role_rejects_unknown_value() {
    let err = "tool".parse::<Role>().unwrap_err();
    assert_eq!(err, ParseRoleError("tool".into()));
    assert!(err.to_string().contains("tool"));
}

#[test]
fn role_serializes_lowercase() {
    assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
    assert_eq!(Role::System.to_string(), "system");
}

// =============================================================================
// Conversation
// =============================================================================

#[test]
fn display_title_falls_back_to_untitled() {
    assert_eq!(sample_conversation(None).display_title(), UNTITLED);
    assert_eq!(sample_conversation(Some("   ")).display_title(), UNTITLED);
    assert_eq!(sample_conversation(Some("Trip plans")).display_title(), "Trip plans");
}

#[test]
fn conversation_serializes_camel_case() {
    let value = serde_json::to_value(sample_conversation(Some("Hi"))).unwrap();
    assert!(value.get("userId").is_some());
    assert!(value.get("updatedAt").is_some());
    assert!(value.get("createdAt").is_some());
    assert!(value.get("user_id").is_none());
}

#[test]
fn conversation_with_messages_flattens_conversation_fields() {
    let item = ConversationWithMessages {
        conversation: sample_conversation(Some("Hi")),
        messages: Vec::new(),
    };
    let value = serde_json::to_value(&item).unwrap();
    assert_eq!(value["title"], "Hi");
    assert_eq!(value["messages"], serde_json::json!([]));
}

#[test]
fn conversation_with_messages_defaults_missing_messages() {
    let json = serde_json::json!({
        "id": Uuid::nil(),
        "title": null,
        "userId": Uuid::nil(),
        "createdAt": "2026-03-15T12:00:00Z",
        "updatedAt": "2026-03-15T12:00:00Z"
    });
    let item: ConversationWithMessages = serde_json::from_value(json).unwrap();
    assert!(item.messages.is_empty());
    assert!(item.preview().is_none());
    assert!(item.conversation.title.is_none());
}

#[test]
fn message_omits_absent_metadata() {
    let message = Message {
        id: Uuid::nil(),
        conversation_id: Uuid::nil(),
        role: Role::User,
        content: "hello".into(),
        metadata: None,
        created_at: sample_conversation(None).created_at,
    };
    let value = serde_json::to_value(&message).unwrap();
    assert!(value.get("metadata").is_none());
    assert_eq!(value["conversationId"], serde_json::json!(Uuid::nil()));
    assert_eq!(value["role"], "user");
}

// =============================================================================
// ConversationPage
// =============================================================================

#[test]
fn page_serializes_null_next_cursor() {
    let value = serde_json::to_value(ConversationPage::empty()).unwrap();
    assert!(value["nextCursor"].is_null());
    assert_eq!(value["conversations"], serde_json::json!([]));
}
