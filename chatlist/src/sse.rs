//! Incremental Server-Sent Events decoder.
//!
//! Bytes arrive in arbitrary chunks: a chunk may end inside a UTF-8
//! sequence, inside a line, or between the `\r` and `\n` of a CRLF pair.
//! [`SseDecoder::push`] buffers whatever is incomplete and returns only
//! events terminated by a blank line.

/// One decoded event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the last `event:` field, if any.
    pub event: Option<String>,
    /// `data:` fields joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Event name, defaulting to `message` as browsers do.
    #[must_use]
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();

        if self.buffer.contains('\r') {
            // A lone trailing '\r' stays put until its '\n' arrives.
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an unterminated trailing event once the stream has closed.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.buffer.push_str(&String::from_utf8_lossy(&rest));
        }
        let block = std::mem::take(&mut self.buffer).replace("\r\n", "\n");
        parse_block(&block)
    }

    fn decode_pending(&mut self) {
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.pending.clear();
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end: keep its bytes for the next chunk.
                let valid = e.valid_up_to();
                self.buffer.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                self.pending.drain(..valid);
            }
            Err(_) => {
                self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
                self.pending.clear();
            }
        }
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_owned()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if data.is_empty() {
        return None;
    }
    Some(SseEvent { event, data: data.join("\n") })
}

#[cfg(test)]
#[path = "sse_test.rs"]
mod tests;
