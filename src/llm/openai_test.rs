use chatlist::Role;

use super::*;
use crate::llm::types::ModelKind;

fn request(messages: Vec<Message>) -> ChatRequest {
    ChatRequest {
        model: ModelKind::Chat,
        system: None,
        messages,
        max_tokens: 256,
        temperature: None,
    }
}

// =============================================================================
// request building
// =============================================================================

#[test]
fn build_messages_prepends_system() {
    let messages = vec![Message::new(Role::User, "hi")];
    let out = build_messages(Some("be brief"), &messages);
    assert_eq!(
        out,
        vec![
            CcMessage { role: "system", content: "be brief" },
            CcMessage { role: "user", content: "hi" },
        ]
    );
}

#[test]
fn build_messages_skips_blank_system() {
    let messages = vec![Message::new(Role::User, "hi"), Message::new(Role::Assistant, "hello")];
    let out = build_messages(Some("   "), &messages);
    assert_eq!(out.len(), 2);
    assert_eq!(out[1].role, "assistant");
}

#[test]
fn non_streaming_body_omits_stream_fields() {
    let req = request(vec![Message::new(Role::User, "hi")]);
    let msgs = build_messages(None, &req.messages);
    let body = serde_json::to_value(CcRequest::new("gpt-4.1-mini", &req, &msgs, false)).unwrap();
    assert_eq!(body["model"], "gpt-4.1-mini");
    assert_eq!(body["max_tokens"], 256);
    assert!(body.get("stream").is_none());
    assert!(body.get("stream_options").is_none());
    assert!(body.get("temperature").is_none());
}

#[test]
fn streaming_body_requests_usage() {
    let mut req = request(vec![Message::new(Role::User, "hi")]);
    req.temperature = Some(0.5);
    let msgs = build_messages(None, &req.messages);
    let body = serde_json::to_value(CcRequest::new("m", &req, &msgs, true)).unwrap();
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"]["include_usage"], true);
    assert_eq!(body["temperature"], 0.5);
}

// =============================================================================
// non-streaming response
// =============================================================================

#[test]
fn parse_text_response() {
    let json = serde_json::json!({
        "model": "gpt-4.1-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "Hello!" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
    })
    .to_string();
    let resp = parse_chat_completions_response(&json).unwrap();
    assert_eq!(resp.text, "Hello!");
    assert_eq!(resp.model, "gpt-4.1-mini");
    assert_eq!(resp.stop_reason, "stop");
    assert_eq!((resp.input_tokens, resp.output_tokens), (10, 5));
}

#[test]
fn parse_null_content_is_empty_text() {
    let json = serde_json::json!({
        "choices": [{
            "message": { "role": "assistant", "content": null },
            "finish_reason": "length"
        }]
    })
    .to_string();
    let resp = parse_chat_completions_response(&json).unwrap();
    assert_eq!(resp.text, "");
    assert_eq!(resp.stop_reason, "length");
    assert_eq!(resp.input_tokens, 0);
}

#[test]
fn parse_missing_choices() {
    let json = serde_json::json!({ "model": "gpt-4o", "choices": [] }).to_string();
    assert!(matches!(parse_chat_completions_response(&json), Err(LlmError::ApiParse(_))));
}

#[test]
fn parse_invalid_json() {
    assert!(matches!(parse_chat_completions_response("not json"), Err(LlmError::ApiParse(_))));
}

// =============================================================================
// stream chunks
// =============================================================================

#[test]
fn chunk_with_delta_text() {
    let payload = r#"{"choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
    let chunk = parse_stream_chunk(payload).unwrap().unwrap();
    assert_eq!(chunk.text.as_deref(), Some("Hel"));
    assert_eq!(chunk.finish_reason, None);
    assert_eq!(chunk.usage, None);
}

#[test]
fn chunk_role_only_has_no_text() {
    let payload = r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#;
    let chunk = parse_stream_chunk(payload).unwrap().unwrap();
    assert_eq!(chunk.text, None);
}

#[test]
fn chunk_with_finish_reason() {
    let payload = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
    let chunk = parse_stream_chunk(payload).unwrap().unwrap();
    assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
}

#[test]
fn usage_only_chunk() {
    let payload = r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#;
    let chunk = parse_stream_chunk(payload).unwrap().unwrap();
    assert_eq!(chunk.usage, Some((12, 34)));
    assert_eq!(chunk.text, None);
}

#[test]
fn null_usage_is_ignored() {
    let payload = r#"{"choices":[{"delta":{"content":"x"}}],"usage":null}"#;
    let chunk = parse_stream_chunk(payload).unwrap().unwrap();
    assert_eq!(chunk.usage, None);
}

#[test]
fn done_sentinel() {
    assert_eq!(parse_stream_chunk("[DONE]").unwrap(), None);
    assert_eq!(parse_stream_chunk(" [DONE] ").unwrap(), None);
}

#[test]
fn error_payload_is_an_error() {
    let payload = r#"{"error":{"message":"overloaded"}}"#;
    let err = parse_stream_chunk(payload).unwrap_err();
    assert!(err.to_string().contains("overloaded"));
}

// =============================================================================
// forward_payload
// =============================================================================

#[tokio::test]
async fn forward_sends_deltas_then_done_with_usage() {
    let (tx, mut rx) = mpsc::channel(8);
    let mut usage = StreamUsage::default();

    let payloads = [
        r#"{"choices":[{"delta":{"content":"Hi"}}]}"#,
        r#"{"choices":[{"delta":{"content":" there"},"finish_reason":"stop"}]}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#,
    ];
    for payload in payloads {
        assert!(matches!(forward_payload(payload, &mut usage, &tx).await.unwrap(), Flow::Continue));
    }
    assert!(matches!(forward_payload("[DONE]", &mut usage, &tx).await.unwrap(), Flow::Finished));
    drop(tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Delta("Hi".into()),
            StreamEvent::Delta(" there".into()),
            StreamEvent::Done { stop_reason: "stop".into(), input_tokens: 3, output_tokens: 2 },
        ]
    );
}

#[tokio::test]
async fn forward_stops_when_receiver_dropped() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let mut usage = StreamUsage::default();
    let flow = forward_payload(r#"{"choices":[{"delta":{"content":"x"}}]}"#, &mut usage, &tx)
        .await
        .unwrap();
    assert!(matches!(flow, Flow::Finished));
}

#[tokio::test]
async fn forward_propagates_bad_chunk() {
    let (tx, _rx) = mpsc::channel(1);
    let mut usage = StreamUsage::default();
    assert!(forward_payload("{oops", &mut usage, &tx).await.is_err());
}

#[test]
fn done_defaults_stop_reason() {
    let done = StreamUsage::default().into_done();
    assert_eq!(
        done,
        StreamEvent::Done { stop_reason: "stop".into(), input_tokens: 0, output_tokens: 0 }
    );
}

#[test]
fn client_trims_base_url() {
    let client = OpenAiClient::new(
        "k".into(),
        "https://example.test/v1/".into(),
        LlmTimeouts { request_secs: 5, connect_secs: 1 },
    )
    .unwrap();
    assert_eq!(client.base_url, "https://example.test/v1");
}
