//! Turn state and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Conversation, TurnError, Usage};

/// Identifies one `send`.
pub type RequestId = Uuid;

/// Where a turn is in its request/stream/tool cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Requesting,
    Streaming,
    ToolLoop,
    Completed,
    Cancelled,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Final report of a turn.
///
/// `conversation` holds every message the turn added, including partial
/// replies left by cancellation or failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnResult {
    pub request_id: RequestId,
    pub state: LifecycleState,
    pub conversation: Conversation,
    /// Summed over every request of the turn.
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnError>,
    pub tool_rounds: usize,
    pub finished_at: DateTime<Utc>,
}

impl TurnResult {
    pub fn is_completed(&self) -> bool {
        self.state == LifecycleState::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == LifecycleState::Cancelled
    }

    /// The last assistant message, usually the model's final answer.
    pub fn reply(&self) -> Option<&crate::types::Message> {
        self.conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::Assistant)
    }
}
