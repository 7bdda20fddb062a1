//! Normalized streaming types.

use serde::{Deserialize, Serialize};

use super::usage::Usage;

/// Provider-independent event produced from one decoded wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    ContentDelta { text: String },
    /// Incremental tool-call data.
    ToolCallDelta(ToolCallDelta),
    /// Authoritative token counts for the current response.
    Usage(Usage),
    /// End of the response.
    Done,
    /// A classified failure.
    Error { kind: StreamErrorKind, message: String },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::ContentDelta { text: text.into() }
    }

    pub fn error(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::error(StreamErrorKind::Malformed, message)
    }
}

/// A fragment of a tool call.
///
/// Providers identify fragments differently: OpenAI sends the id only on
/// the first fragment and a positional `index` on all of them, Anthropic
/// uses the content block index, and Google sends whole calls without ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Classification carried by `StreamEvent::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// Connection, DNS, timeout or mid-body read failure.
    Transport,
    /// Non-2xx response.
    HttpStatus(u16),
    /// One frame did not match the expected schema; it is skipped.
    Malformed,
    /// The byte stream itself is unusable; the response is aborted.
    Corrupted,
    /// The provider reported an error inside the stream.
    Provider,
    /// The request could not be built.
    Request,
    /// The model kept requesting tools past the configured bound.
    ToolLoopExceeded,
}

impl StreamErrorKind {
    /// Whether the aggregator should skip the frame instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed)
    }
}

/// Cloneable summary of why a turn failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl TurnError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&crate::error::TalkwireError> for TurnError {
    fn from(err: &crate::error::TalkwireError) -> Self {
        let message = match err {
            crate::error::TalkwireError::HttpStatus { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::new(err.stream_kind(), message)
    }
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            StreamErrorKind::HttpStatus(status) => write!(f, "HTTP {status}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}
