//! Incremental decoding of `text/event-stream` completion bodies.
//!
//! Network chunks do not respect line boundaries: a JSON payload, or even a
//! multi-byte UTF-8 sequence, may be split across two reads. The decoder keeps
//! the unfinished tail of the previous chunk and only interprets complete
//! lines.

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::provider::{CompletionError, CompletionResult};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// A recognized event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Interprets one complete line. Returns `None` for anything that is not a
/// data line carrying a non-empty delta or the end sentinel.
pub fn parse_event_line(line: &str) -> Option<SseEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let data = line.strip_prefix(DATA_PREFIX)?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim() == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(error) => {
            tracing::trace!(error = %error, line_len = data.len(), "skipping unparsable event line");
            return None;
        }
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map(SseEvent::Delta)
}

/// Splits an arbitrarily chunked byte stream into lines.
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    pending: Vec<u8>,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns the events of every line it
    /// completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&byte| byte == b'\n') {
            let line = self.pending.drain(..=newline).collect::<Vec<_>>();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(event) = parse_event_line(&text) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.pending.is_empty() {
            return None;
        }

        let line = std::mem::take(&mut self.pending);
        parse_event_line(&String::from_utf8_lossy(&line))
    }
}

/// Drains `body`, calling `on_delta` for every delta, until the end sentinel
/// or the end of the body. Both endings are a successful completion.
pub async fn consume_event_stream<S, B, E, F>(body: S, on_delta: &mut F) -> CompletionResult<()>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: FnMut(String),
{
    let mut body = std::pin::pin!(body);
    let mut decoder = EventLineDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|error| CompletionError::ReadBody {
            stage: "read-stream-chunk",
            message: error.to_string(),
        })?;

        for event in decoder.push(chunk.as_ref()) {
            match event {
                SseEvent::Delta(text) => on_delta(text),
                SseEvent::Done => return Ok(()),
            }
        }
    }

    if let Some(SseEvent::Delta(text)) = decoder.finish() {
        on_delta(text);
    }

    tracing::debug!("event stream ended without sentinel");
    Ok(())
}
