//! OpenAI-compatible `/chat/completions` client.
//!
//! Works against OpenAI itself and any endpoint that speaks the same wire
//! format (Groq, local gateways). Streaming uses `stream: true` and reads the
//! `data:` lines of the SSE response until `[DONE]`.

use std::time::Duration;

use chatlist::SseDecoder;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::config::LlmTimeouts;
use super::types::{ChatRequest, ChatResponse, LlmError, Message, StreamEvent};

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns [`LlmError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(api_key: String, base_url: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub async fn chat(&self, model: &str, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let msgs = build_messages(request.system.as_deref(), &request.messages);
        let body = CcRequest::new(model, request, &msgs, false);
        let response = self.send(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_chat_completions_response(&text)
    }

    pub async fn stream_chat(
        &self,
        model: &str,
        request: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let msgs = build_messages(request.system.as_deref(), &request.messages);
        let body = CcRequest::new(model, request, &msgs, true);
        let response = self.send(&body).await?;

        let mut decoder = SseDecoder::new();
        let mut usage = StreamUsage::default();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| LlmError::ApiRequest(e.to_string()))?;
            for event in decoder.push(&chunk) {
                match forward_payload(&event.data, &mut usage, &tx).await? {
                    Flow::Continue => {}
                    Flow::Finished => return Ok(()),
                }
            }
        }
        if let Some(event) = decoder.finish() {
            if let Flow::Finished = forward_payload(&event.data, &mut usage, &tx).await? {
                return Ok(());
            }
        }

        // Some gateways close the stream without the `[DONE]` sentinel.
        let _ = tx.send(usage.into_done()).await;
        Ok(())
    }

    async fn send(&self, body: &CcRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiResponse { status, body: text });
        }
        Ok(response)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct CcRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [CcMessage<'a>],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl<'a> CcRequest<'a> {
    fn new(
        model: &'a str,
        request: &ChatRequest,
        messages: &'a [CcMessage<'a>],
        stream: bool,
    ) -> Self {
        Self {
            model,
            max_tokens: request.max_tokens,
            messages,
            temperature: request.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct CcMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn build_messages<'a>(system: Option<&'a str>, messages: &'a [Message]) -> Vec<CcMessage<'a>> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        out.push(CcMessage { role: "system", content: system });
    }
    out.extend(
        messages
            .iter()
            .map(|m| CcMessage { role: m.role.as_str(), content: &m.content }),
    );
    out
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

pub(crate) fn parse_chat_completions_response(json_text: &str) -> Result<ChatResponse, LlmError> {
    let root: Value =
        serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    let (input_tokens, output_tokens) = parse_usage(&root);

    let Some(choice) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    else {
        return Err(LlmError::ApiParse("chat_completions: missing choices[0]".to_string()));
    };
    let stop_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .unwrap_or("stop")
        .to_string();
    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ChatResponse { text, model, stop_reason, input_tokens, output_tokens })
}

fn parse_usage(root: &Value) -> (u64, u64) {
    let usage = root.get("usage");
    let field = |name: &str| {
        usage
            .and_then(|u| u.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    (field("prompt_tokens"), field("completion_tokens"))
}

/// What one streamed `data:` payload carried.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct StreamChunk {
    pub text: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<(u64, u64)>,
}

/// Parse one `data:` payload of a streamed completion.
///
/// Returns `Ok(None)` for the `[DONE]` sentinel.
pub(crate) fn parse_stream_chunk(payload: &str) -> Result<Option<StreamChunk>, LlmError> {
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(None);
    }
    let root: Value = serde_json::from_str(payload).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    if let Some(error) = root.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown stream error");
        return Err(LlmError::ApiParse(format!("stream error: {message}")));
    }

    let choice = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first());
    let text = choice
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_owned);
    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let usage = root
        .get("usage")
        .filter(|u| u.is_object())
        .map(|_| parse_usage(&root));

    Ok(Some(StreamChunk { text, finish_reason, usage }))
}

#[derive(Debug, Default)]
struct StreamUsage {
    stop_reason: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
}

impl StreamUsage {
    fn into_done(self) -> StreamEvent {
        StreamEvent::Done {
            stop_reason: self.stop_reason.unwrap_or_else(|| "stop".to_string()),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        }
    }
}

enum Flow {
    Continue,
    Finished,
}

async fn forward_payload(
    payload: &str,
    usage: &mut StreamUsage,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<Flow, LlmError> {
    let Some(chunk) = parse_stream_chunk(payload)? else {
        let _ = tx.send(std::mem::take(usage).into_done()).await;
        return Ok(Flow::Finished);
    };
    if let Some(reason) = chunk.finish_reason {
        usage.stop_reason = Some(reason);
    }
    if let Some((input, output)) = chunk.usage {
        usage.input_tokens = input;
        usage.output_tokens = output;
    }
    if let Some(text) = chunk.text {
        if tx.send(StreamEvent::Delta(text)).await.is_err() {
            // Receiver dropped.
            return Ok(Flow::Finished);
        }
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
