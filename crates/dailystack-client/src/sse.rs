//! Incremental decoding of the `ask-llm` server-sent event stream.
//!
//! The backend answers with a chunked body made of lines such as
//!
//! ```text
//! data: {"answer": "Hel"}
//! data: {"answer": "lo"}
//! ```
//!
//! Chunk boundaries are arbitrary: a chunk may end in the middle of a line,
//! of a JSON token, or of a multi-byte UTF-8 character. [`SseDecoder`] buffers
//! raw bytes and only decodes complete lines, so the decoded fragments do not
//! depend on how the body was split.
//!
//! # Example
//!
//! ```
//! use dailystack_client::sse::{SseDecoder, StreamEvent};
//!
//! let mut decoder = SseDecoder::new();
//! let mut events = decoder.feed(b"data: {\"answer\":\"Hel\"}\ndata: {\"ans");
//! events.extend(decoder.feed(b"wer\":\"lo\"}\n"));
//! events.extend(decoder.finish());
//!
//! assert_eq!(
//!     events,
//!     vec![
//!         StreamEvent::Answer("Hel".to_string()),
//!         StreamEvent::Answer("lo".to_string()),
//!     ]
//! );
//! ```

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Prefix marking an event line.
pub const DATA_PREFIX: &str = "data: ";

/// A parsed payload from the answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of the answer, to be appended to the active message.
    Answer(String),
    /// The backend gave up; the active message should show this instead.
    Error(String),
}

/// JSON carried by one `data:` line.
#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Line-buffering decoder for the answer stream.
///
/// Feed it chunks in arrival order; each call returns the events completed by
/// that chunk. Call [`SseDecoder::finish`] once the body ends.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the events of every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        // Keep the incomplete tail for the next chunk.
        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete
            .split(|&b| b == b'\n')
            .filter_map(parse_line)
            .collect()
    }

    /// Flushes whatever is left in the buffer as a final line.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest).into_iter().collect()
    }

    /// Returns the number of buffered bytes not yet forming a complete line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Parses one line into an event, if it carries one.
fn parse_line(raw: &[u8]) -> Option<StreamEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);

    let data = line.strip_prefix(DATA_PREFIX)?;
    if data.trim().is_empty() {
        return None;
    }

    let payload: EventPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, line = %data, "Dropping malformed stream event");
            return None;
        }
    };

    match payload {
        EventPayload {
            answer: Some(answer),
            ..
        } if !answer.is_empty() => Some(StreamEvent::Answer(answer)),
        EventPayload {
            error: Some(error), ..
        } => Some(StreamEvent::Error(error)),
        _ => {
            debug!(line = %data, "Ignoring stream event without answer or error");
            None
        }
    }
}

/// State carried between polls of [`decode_stream`].
struct DecodeState<S> {
    chunks: S,
    decoder: SseDecoder,
    ready: VecDeque<StreamEvent>,
    finished: bool,
}

/// Turns a stream of body chunks into a lazy stream of events.
///
/// Events are yielded in order as soon as the line that carries them is
/// complete. A transport error is yielded once and ends the stream; the
/// end of the body flushes the last unterminated line.
pub fn decode_stream<S>(chunks: S) -> impl Stream<Item = Result<StreamEvent, ClientError>>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
{
    let state = DecodeState {
        chunks,
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(&chunk);
                    state.ready.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    let events = state.decoder.finish();
                    state.ready.extend(events);
                }
            }
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
