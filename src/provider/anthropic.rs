//! Anthropic Messages API wire format.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ProviderConfig;
use crate::error::{Result, TalkwireError};
use crate::models::{ModelCapabilities, ProviderFamily, ProviderKind};
use crate::types::{Conversation, Message, Role, StreamErrorKind, StreamEvent, ToolCall, ToolCallDelta, TypedData, Usage};

use super::format::{arguments_value, inline_text, merge_turns, null_as_default, unsupported, Turn};
use super::http::{anthropic_headers, extract_error_message};
use super::{FinalResponse, ProviderAdapter, ToolDefinition, WireRequest};

const API_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    fn message_blocks(&self, msg: &Message, capabilities: &ModelCapabilities) -> Result<Turn> {
        let mut parts = Vec::new();
        let role = match msg.role {
            // Hoisted into the top-level `system` field.
            Role::System => "system",
            Role::User => {
                if !msg.content.is_empty() {
                    parts.push(json!({ "type": "text", "text": msg.content }));
                }
                for attachment in &msg.attachments {
                    parts.push(attachment_block(attachment, capabilities)?);
                }
                "user"
            }
            Role::Assistant => {
                if !msg.content.is_empty() {
                    parts.push(json!({ "type": "text", "text": msg.content }));
                }
                for tc in &msg.tool_calls {
                    parts.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": arguments_value(tc),
                    }));
                }
                "assistant"
            }
            Role::Tool => {
                let (tool_use_id, is_error) = msg
                    .tool_response
                    .as_ref()
                    .map(|r| (r.tool_call_id.as_str(), r.is_error))
                    .unwrap_or_default();
                parts.push(json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": msg.content,
                    "is_error": is_error,
                }));
                "user"
            }
        };
        Ok(Turn { role, parts })
    }
}

fn attachment_block(attachment: &TypedData, capabilities: &ModelCapabilities) -> Result<Value> {
    if attachment.is_text() {
        return Ok(json!({ "type": "text", "text": inline_text(attachment) }));
    }
    if attachment.is_image() && capabilities.supports_vision {
        return Ok(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": attachment.mime_type,
                "data": attachment.base64(),
            }
        }));
    }
    if attachment.is_pdf() && capabilities.supports_documents {
        return Ok(json!({
            "type": "document",
            "source": {
                "type": "base64",
                "media_type": attachment.mime_type,
                "data": attachment.base64(),
            }
        }));
    }
    Err(unsupported(ProviderKind::Anthropic, attachment))
}

impl ProviderAdapter for AnthropicAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        config: &ProviderConfig,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<WireRequest> {
        let capabilities = config.capabilities();
        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns = Vec::with_capacity(conversation.len());
        for msg in conversation.sendable() {
            if msg.role == Role::System {
                if !msg.content.trim().is_empty() {
                    system_parts.push(&msg.content);
                }
                continue;
            }
            turns.push(self.message_blocks(msg, &capabilities)?);
        }
        if system_parts.is_empty() {
            system_parts.extend(config.system_prompt());
        }

        let messages: Vec<Value> = merge_turns(turns)
            .into_iter()
            .map(|turn| json!({ "role": turn.role, "content": turn.parts }))
            .collect();

        let mut obj = Map::new();
        obj.insert("model".into(), config.model.clone().into());
        obj.insert("messages".into(), messages.into());
        obj.insert(
            "max_tokens".into(),
            config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).into(),
        );
        obj.insert("stream".into(), stream.into());
        if !system_parts.is_empty() {
            obj.insert("system".into(), system_parts.join("\n\n").into());
        }
        if let Some(temp) = config.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = config.top_p {
            obj.insert("top_p".into(), top_p.into());
        }

        if !tools.is_empty() && capabilities.supports_tools {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
        }

        Ok(WireRequest {
            url: format!("{}/messages", config.host()),
            headers: anthropic_headers(&config.api_key, API_VERSION),
            body: Value::Object(obj),
            stream,
        })
    }

    fn parse_event(&self, frame: &Value) -> Vec<StreamEvent> {
        let event = match AnthropicStreamEvent::deserialize(frame) {
            Ok(event) => event,
            Err(err) => return vec![StreamEvent::malformed(format!("unexpected event shape: {err}"))],
        };

        match event {
            AnthropicStreamEvent::MessageStart { message } => message
                .usage
                .map(|u| vec![StreamEvent::Usage(Usage::new(u.input_tokens, u.output_tokens))])
                .unwrap_or_default(),
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStartBlock::ToolUse { id, name } => {
                    vec![StreamEvent::ToolCallDelta(ToolCallDelta {
                        index: Some(index),
                        id: Some(id),
                        name: Some(name),
                        arguments: None,
                    })]
                }
                AnthropicStartBlock::Text { text } if !text.is_empty() => {
                    vec![StreamEvent::ContentDelta { text }]
                }
                _ => Vec::new(),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicDelta::TextDelta { text } if !text.is_empty() => {
                    vec![StreamEvent::ContentDelta { text }]
                }
                AnthropicDelta::InputJsonDelta { partial_json } if !partial_json.is_empty() => {
                    vec![StreamEvent::ToolCallDelta(ToolCallDelta {
                        index: Some(index),
                        arguments: Some(partial_json),
                        ..Default::default()
                    })]
                }
                _ => Vec::new(),
            },
            AnthropicStreamEvent::MessageDelta { usage } => usage
                .map(|u| vec![StreamEvent::Usage(Usage::new(u.input_tokens, u.output_tokens))])
                .unwrap_or_default(),
            AnthropicStreamEvent::MessageStop => vec![StreamEvent::Done],
            AnthropicStreamEvent::Error { .. } => {
                let message = extract_error_message(frame)
                    .unwrap_or_else(|| "provider reported an error".into());
                vec![StreamEvent::error(StreamErrorKind::Provider, message)]
            }
            AnthropicStreamEvent::Other => Vec::new(),
        }
    }

    fn parse_final_response(&self, body: &Value) -> Result<FinalResponse> {
        if body.get("type").and_then(Value::as_str) == Some("error") {
            return Err(TalkwireError::Provider(
                extract_error_message(body).unwrap_or_else(|| "provider reported an error".into()),
            ));
        }
        let data = AnthropicResponse::deserialize(body)
            .map_err(|e| TalkwireError::MalformedFrame(e.to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in data.content {
            match block.r#type.as_str() {
                "text" => content.push_str(block.text.as_deref().unwrap_or_default()),
                "tool_use" => tool_calls.push(ToolCall::new(
                    block.id.unwrap_or_default(),
                    block.name.unwrap_or_default(),
                    block.input.unwrap_or_else(|| json!({})).to_string(),
                )),
                _ => {}
            }
        }

        Ok(FinalResponse {
            content,
            tool_calls,
            usage: data
                .usage
                .map(|u| Usage::new(u.input_tokens, u.output_tokens))
                .unwrap_or_default(),
        })
    }
}

// Internal Anthropic wire types

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicStartMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: AnthropicStartBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: AnthropicDelta,
    },
    MessageDelta {
        usage: Option<AnthropicUsage>,
    },
    MessageStop,
    Error {},
    /// `ping`, `content_block_stop` and future event types.
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicStartMessage {
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStartBlock {
    Text {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    InputJsonDelta {
        #[serde(default, deserialize_with = "null_as_default")]
        partial_json: String,
    },
    /// Thinking, signature and citation deltas are not surfaced.
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    input_tokens: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    content: Vec<AnthropicContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}
