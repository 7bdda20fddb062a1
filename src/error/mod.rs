//! Error types for Talkwire.

use thiserror::Error;

use crate::types::StreamErrorKind;

/// Primary error type for all Talkwire operations.
#[derive(Error, Debug)]
pub enum TalkwireError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    TransportMessage(String),

    #[error("HTTP error (status {status}): {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Malformed stream frame: {0}")]
    MalformedFrame(String),

    #[error("Stream corrupted: {0}")]
    StreamCorrupted(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{provider} cannot represent attachments of type {mime_type}")]
    UnsupportedContent { provider: String, mime_type: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool loop exceeded {limit} rounds")]
    ToolLoopExceeded { limit: usize },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for deciding what the UI offers the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Protocol,
    Request,
    ToolExecution,
    Cancelled,
    Configuration,
    Unknown,
}

impl TalkwireError {
    /// Create an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::TransportMessage(_) | Self::Io(_) => ErrorCategory::Network,
            Self::HttpStatus { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::MalformedFrame(_) | Self::StreamCorrupted(_) | Self::Serialization(_) => {
                ErrorCategory::Protocol
            }
            Self::Provider(_) => ErrorCategory::Api,
            Self::UnsupportedContent { .. } | Self::InvalidArgument(_) => ErrorCategory::Request,
            Self::ToolExecution { .. } | Self::ToolLoopExceeded { .. } => {
                ErrorCategory::ToolExecution
            }
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a manual resend of the same conversation could succeed.
    ///
    /// Nothing is retried automatically; this only informs the caller.
    pub fn can_resend(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Server
                | ErrorCategory::Protocol
                | ErrorCategory::Api
                | ErrorCategory::Cancelled
        )
    }

    /// The tag carried by an `Error` stream event for this failure.
    pub fn stream_kind(&self) -> StreamErrorKind {
        match self {
            Self::Transport(_) | Self::TransportMessage(_) | Self::Io(_) => {
                StreamErrorKind::Transport
            }
            Self::HttpStatus { status, .. } => StreamErrorKind::HttpStatus(*status),
            Self::MalformedFrame(_) | Self::Serialization(_) => StreamErrorKind::Malformed,
            Self::StreamCorrupted(_) => StreamErrorKind::Corrupted,
            Self::Provider(_) => StreamErrorKind::Provider,
            Self::ToolLoopExceeded { .. } => StreamErrorKind::ToolLoopExceeded,
            Self::UnsupportedContent { .. }
            | Self::ToolExecution { .. }
            | Self::Cancelled
            | Self::Configuration(_)
            | Self::InvalidArgument(_)
            | Self::InvalidState(_) => StreamErrorKind::Request,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TalkwireError>;
