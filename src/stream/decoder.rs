//! Line framing for streamed provider bodies.
//!
//! [`StreamDecoder`] is a synchronous state machine: feed it chunks as they
//! arrive and it hands back whole frames, buffering any partial line until
//! the rest shows up. [`decode_stream`] drives it from an async byte stream
//! with cancellation and an idle timeout.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use memchr::memchr;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Result, TalkwireError};
use crate::provider::http::ByteStream;

const DONE_SENTINEL: &str = "[DONE]";

/// How payload lines are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Server-Sent Events: `data: <json>` lines, blank-line separators.
    #[default]
    Sse,
    /// One JSON document per line.
    Ndjson,
}

/// One decoded unit of a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Json(Value),
    /// End-of-stream sentinel.
    Done,
    /// A payload that is not JSON. `corrupt` marks damage to the byte stream
    /// itself (bad UTF-8, truncated final line) rather than one odd frame.
    Invalid { raw: String, corrupt: bool },
}

/// Restartable per-request line decoder.
#[derive(Debug)]
pub struct StreamDecoder {
    framing: Framing,
    buffer: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Whether the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Append a chunk and return every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + pos;
            let line = self.buffer[start..end].to_vec();
            start = end + 1;
            if let Some(frame) = self.decode_line(&line, false) {
                frames.push(frame);
                if self.done {
                    break;
                }
            }
        }
        self.buffer.drain(..start);
        if self.done {
            self.buffer.clear();
        }
        frames
    }

    /// Flush a trailing line that had no newline. Call once at end of body.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line, true).into_iter().collect()
    }

    fn decode_line(&mut self, line: &[u8], at_eof: bool) -> Option<Frame> {
        let line = match std::str::from_utf8(line) {
            Ok(s) => s.trim(),
            Err(_) => {
                return Some(Frame::Invalid {
                    raw: String::from_utf8_lossy(line).into_owned(),
                    corrupt: true,
                })
            }
        };
        if line.is_empty() {
            return None;
        }
        trace!(line, "stream line");

        let payload = match self.framing {
            Framing::Ndjson => line,
            Framing::Sse => {
                if line.starts_with(':') {
                    return None;
                }
                match line.strip_prefix("data:") {
                    Some(data) => data.trim_start(),
                    None if is_sse_field(line) => return None,
                    // Some servers write bare JSON (usually an error body)
                    // into an event stream.
                    None => line,
                }
            }
        };

        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(Frame::Done);
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => Some(Frame::Json(value)),
            Err(_) => Some(Frame::Invalid {
                raw: payload.to_string(),
                corrupt: at_eof,
            }),
        }
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
        || matches!(line, "event" | "id" | "retry" | "data")
}

/// Decode a response body into frames.
///
/// The stream ends after the sentinel, at end of body, or as soon as
/// `cancel` fires; a cancelled stream yields nothing further. Waiting longer
/// than `idle_timeout` for a chunk yields a transport error.
pub fn decode_stream(
    body: ByteStream,
    framing: Framing,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
) -> BoxStream<'static, Result<Frame>> {
    let stream = async_stream::stream! {
        let mut body = body;
        let mut decoder = StreamDecoder::new(framing);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = next_chunk(&mut body, idle_timeout) => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    for frame in decoder.feed(&chunk) {
                        yield Ok(frame);
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    yield Err(err);
                    break;
                }
                None => {
                    for frame in decoder.finish() {
                        yield Ok(frame);
                    }
                    break;
                }
            }
        }
    };
    Box::pin(stream)
}

async fn next_chunk(body: &mut ByteStream, idle_timeout: Option<Duration>) -> Option<Result<Vec<u8>>> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, body.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(TalkwireError::TransportMessage(format!(
                "stream idle for {}s",
                limit.as_secs()
            )))),
        },
        None => body.next().await,
    }
}
