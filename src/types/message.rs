//! Conversation and message types.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stream::TurnError;
use super::usage::Usage;

/// An ordered sequence of messages forming one chat thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The first non-system message, which starts the thread.
    pub fn thread_start(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role != Role::System)
    }

    /// Messages that may be serialized into a provider request.
    ///
    /// Drafts still being streamed are skipped.
    pub fn sendable(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_sendable())
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::System)
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Whether a message is still receiving streamed content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Replying,
    Final,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<TypedData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<ToolResponse>,
    pub state: MessageState,
    /// Set when the reply ended in an error; partial content is kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String, state: MessageState) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_response: None,
            state,
            error: None,
            usage: None,
            created_at: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text.into(), MessageState::Final)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), MessageState::Final)
    }

    /// Create a user message carrying attachments.
    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<TypedData>) -> Self {
        let mut message = Self::user(text);
        message.attachments = attachments;
        message
    }

    /// Create a finished assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into(), MessageState::Final)
    }

    /// Create a finished assistant message that requested tool calls.
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::assistant(text);
        message.tool_calls = tool_calls;
        message
    }

    /// Create the empty assistant message a reply streams into.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), MessageState::Replying)
    }

    /// Create a tool result message.
    pub fn tool(response: ToolResponse, text: impl Into<String>, attachments: Vec<TypedData>) -> Self {
        let mut message = Self::new(Role::Tool, text.into(), MessageState::Final);
        message.tool_response = Some(response);
        message.attachments = attachments;
        message
    }

    pub fn is_sendable(&self) -> bool {
        self.state == MessageState::Final
    }

    pub fn is_replying(&self) -> bool {
        self.state == MessageState::Replying
    }
}

/// A file, image or audio attachment.
///
/// The payload is shared, so cloning a message never copies attachment bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypedData {
    pub mime_type: String,
    pub data: Arc<[u8]>,
    pub display_name: String,
}

impl TypedData {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>, display_name: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            display_name: display_name.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }

    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
            || matches!(
                self.mime_type.as_str(),
                "application/json" | "application/xml" | "application/x-yaml"
            )
    }

    /// Standard base64 encoding of the payload.
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// The payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON text, concatenated from streamed fragments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Whether the call has a name and arguments that parse as a JSON object.
    ///
    /// Empty arguments count as `{}`; some providers send nothing for
    /// parameterless functions.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && self.parsed_arguments().is_ok()
    }

    /// Parse the accumulated argument text.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        let trimmed = self.arguments.trim();
        if trimmed.is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(trimmed)
    }
}

/// Links a tool message back to the call it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub is_error: bool,
}
