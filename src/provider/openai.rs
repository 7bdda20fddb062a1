//! OpenAI Chat Completions wire format.
//!
//! Shared by OpenAI, OpenRouter, Groq, Mistral, Together and local
//! OpenAI-compatible servers.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ProviderConfig;
use crate::error::{Result, TalkwireError};
use crate::models::{ModelCapabilities, ProviderFamily, ProviderKind};
use crate::types::{Conversation, Message, Role, StreamErrorKind, StreamEvent, ToolCall, ToolCallDelta, TypedData, Usage};

use super::format::{data_url, inline_text, null_as_default, unsupported};
use super::http::{bearer_headers, extract_error_message};
use super::{FinalResponse, ProviderAdapter, ToolDefinition, WireRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenAiAdapter {
    kind: ProviderKind,
}

impl OpenAiAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn message_to_openai(&self, msg: &Message, capabilities: &ModelCapabilities) -> Result<Value> {
        Ok(match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content }),
            Role::User if msg.attachments.is_empty() => {
                json!({ "role": "user", "content": msg.content })
            }
            Role::User => {
                let mut parts = Vec::with_capacity(msg.attachments.len() + 1);
                if !msg.content.is_empty() {
                    parts.push(json!({ "type": "text", "text": msg.content }));
                }
                for attachment in &msg.attachments {
                    parts.push(self.attachment_part(attachment, capabilities)?);
                }
                json!({ "role": "user", "content": parts })
            }
            Role::Assistant if msg.tool_calls.is_empty() => {
                json!({ "role": "assistant", "content": msg.content })
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": if tc.arguments.trim().is_empty() { "{}" } else { tc.arguments.as_str() },
                            }
                        })
                    })
                    .collect();
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(msg.content.clone())
                };
                json!({ "role": "assistant", "content": content, "tool_calls": tool_calls })
            }
            Role::Tool => {
                let tool_call_id = msg
                    .tool_response
                    .as_ref()
                    .map(|r| r.tool_call_id.as_str())
                    .unwrap_or_default();
                json!({ "role": "tool", "tool_call_id": tool_call_id, "content": msg.content })
            }
        })
    }

    fn attachment_part(&self, attachment: &TypedData, capabilities: &ModelCapabilities) -> Result<Value> {
        if attachment.is_text() {
            return Ok(json!({ "type": "text", "text": inline_text(attachment) }));
        }
        if attachment.is_image() && capabilities.supports_vision {
            return Ok(json!({
                "type": "image_url",
                "image_url": { "url": data_url(attachment) }
            }));
        }
        if attachment.is_audio() && capabilities.supports_audio {
            let format = match attachment.mime_type.as_str() {
                "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
                "audio/mpeg" | "audio/mp3" => Some("mp3"),
                _ => None,
            };
            if let Some(format) = format {
                return Ok(json!({
                    "type": "input_audio",
                    "input_audio": { "data": attachment.base64(), "format": format }
                }));
            }
        }
        Err(unsupported(self.kind, attachment))
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAiCompatible
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        config: &ProviderConfig,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<WireRequest> {
        let capabilities = config.capabilities();
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !conversation.has_system_message() {
            if let Some(prompt) = config.system_prompt() {
                messages.push(json!({ "role": "system", "content": prompt }));
            }
        }
        for msg in conversation.sendable() {
            messages.push(self.message_to_openai(msg, &capabilities)?);
        }

        let mut obj = Map::new();
        obj.insert("model".into(), config.model.clone().into());
        obj.insert("messages".into(), messages.into());
        obj.insert("stream".into(), stream.into());

        if let Some(max) = config.max_tokens {
            obj.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = config.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = config.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(fp) = config.frequency_penalty {
            obj.insert("frequency_penalty".into(), fp.into());
        }
        if let Some(pp) = config.presence_penalty {
            obj.insert("presence_penalty".into(), pp.into());
        }
        if stream && self.kind.streams_usage_on_request() {
            obj.insert("stream_options".into(), json!({ "include_usage": true }));
        }

        if !tools.is_empty() && capabilities.supports_tools {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
        }

        Ok(WireRequest {
            url: format!("{}/chat/completions", config.host()),
            headers: bearer_headers(&config.api_key),
            body: Value::Object(obj),
            stream,
        })
    }

    fn parse_event(&self, frame: &Value) -> Vec<StreamEvent> {
        if let Some(message) = provider_error(frame) {
            return vec![StreamEvent::error(StreamErrorKind::Provider, message)];
        }
        let chunk = match OpenAiStreamChunk::deserialize(frame) {
            Ok(chunk) => chunk,
            Err(err) => return vec![StreamEvent::malformed(format!("unexpected chunk shape: {err}"))],
        };

        let mut events = Vec::new();
        // Only the first choice is tracked; requests never ask for n > 1.
        if let Some(delta) = chunk
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
        {
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::ContentDelta { text });
            }
            for tc in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                events.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                    index: tc.index,
                    id: tc.id.filter(|s| !s.is_empty()),
                    name: name.filter(|s| !s.is_empty()),
                    arguments: arguments.filter(|s| !s.is_empty()),
                }));
            }
        }
        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(usage.into()));
        }
        events
    }

    fn parse_final_response(&self, body: &Value) -> Result<FinalResponse> {
        if let Some(message) = provider_error(body) {
            return Err(TalkwireError::Provider(message));
        }
        let data = OpenAiChatResponse::deserialize(body)
            .map_err(|e| TalkwireError::MalformedFrame(e.to_string()))?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TalkwireError::MalformedFrame("response has no choices".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        Ok(FinalResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: data.usage.map(Usage::from).unwrap_or_default(),
        })
    }
}

fn provider_error(frame: &Value) -> Option<String> {
    frame
        .get("error")
        .filter(|e| !e.is_null())
        .map(|_| extract_error_message(frame).unwrap_or_else(|| "provider reported an error".into()))
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    prompt_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    completion_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    choices: Option<Vec<OpenAiStreamChoice>>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
