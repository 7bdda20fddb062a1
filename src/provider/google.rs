//! Google Gemini (Generative Language API) wire format.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ProviderConfig;
use crate::error::{Result, TalkwireError};
use crate::models::{ModelCapabilities, ProviderFamily, ProviderKind};
use crate::types::{Conversation, Message, Role, StreamErrorKind, StreamEvent, ToolCall, ToolCallDelta, TypedData, Usage};

use super::format::{arguments_value, inline_text, merge_turns, null_as_default, unsupported, Turn};
use super::http::{extract_error_message, google_headers};
use super::{FinalResponse, ProviderAdapter, ToolDefinition, WireRequest};

/// Finish reasons that mean the candidate was withheld.
const BLOCKED_REASONS: &[&str] = &["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoogleAdapter;

impl GoogleAdapter {
    fn message_parts(&self, msg: &Message, capabilities: &ModelCapabilities) -> Result<Turn> {
        let mut parts = Vec::new();
        let role = match msg.role {
            Role::System => "system",
            Role::User => {
                if !msg.content.is_empty() {
                    parts.push(json!({ "text": msg.content }));
                }
                for attachment in &msg.attachments {
                    parts.push(attachment_part(attachment, capabilities)?);
                }
                "user"
            }
            Role::Assistant => {
                if !msg.content.is_empty() {
                    parts.push(json!({ "text": msg.content }));
                }
                for tc in &msg.tool_calls {
                    parts.push(json!({
                        "functionCall": { "name": tc.name, "args": arguments_value(tc) }
                    }));
                }
                "model"
            }
            // Gemini has no tool role; results travel in a user turn.
            Role::Tool => {
                let name = msg
                    .tool_response
                    .as_ref()
                    .map(|r| r.tool_name.as_str())
                    .unwrap_or_default();
                parts.push(json!({
                    "functionResponse": {
                        "name": name,
                        "response": { "name": name, "content": msg.content },
                    }
                }));
                "user"
            }
        };
        Ok(Turn { role, parts })
    }
}

fn attachment_part(attachment: &TypedData, capabilities: &ModelCapabilities) -> Result<Value> {
    if attachment.is_text() {
        return Ok(json!({ "text": inline_text(attachment) }));
    }
    let allowed = (attachment.is_image() && capabilities.supports_vision)
        || (attachment.is_audio() && capabilities.supports_audio)
        || (attachment.is_pdf() && capabilities.supports_documents);
    if !allowed {
        return Err(unsupported(ProviderKind::Google, attachment));
    }
    Ok(json!({
        "inlineData": { "mimeType": attachment.mime_type, "data": attachment.base64() }
    }))
}

impl ProviderAdapter for GoogleAdapter {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Google
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        config: &ProviderConfig,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<WireRequest> {
        let capabilities = config.capabilities();
        let mut system_parts: Vec<Value> = Vec::new();
        let mut turns = Vec::with_capacity(conversation.len());
        for msg in conversation.sendable() {
            if msg.role == Role::System {
                if !msg.content.trim().is_empty() {
                    system_parts.push(json!({ "text": msg.content }));
                }
                continue;
            }
            turns.push(self.message_parts(msg, &capabilities)?);
        }
        if system_parts.is_empty() {
            if let Some(prompt) = config.system_prompt() {
                system_parts.push(json!({ "text": prompt }));
            }
        }

        let contents: Vec<Value> = merge_turns(turns)
            .into_iter()
            .map(|turn| json!({ "role": turn.role, "parts": turn.parts }))
            .collect();

        let mut obj = Map::new();
        obj.insert("contents".into(), contents.into());
        if !system_parts.is_empty() {
            obj.insert("systemInstruction".into(), json!({ "parts": system_parts }));
        }

        let mut gen_config = Map::new();
        if let Some(max) = config.max_tokens {
            gen_config.insert("maxOutputTokens".into(), max.into());
        }
        if let Some(temp) = config.temperature {
            gen_config.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = config.top_p {
            gen_config.insert("topP".into(), top_p.into());
        }
        if let Some(fp) = config.frequency_penalty {
            gen_config.insert("frequencyPenalty".into(), fp.into());
        }
        if let Some(pp) = config.presence_penalty {
            gen_config.insert("presencePenalty".into(), pp.into());
        }
        if !gen_config.is_empty() {
            obj.insert("generationConfig".into(), Value::Object(gen_config));
        }

        if !tools.is_empty() && capabilities.supports_tools {
            let fn_decls: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            obj.insert("tools".into(), json!([{ "functionDeclarations": fn_decls }]));
        }

        let url = if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", config.host(), config.model)
        } else {
            format!("{}/models/{}:generateContent", config.host(), config.model)
        };

        Ok(WireRequest {
            url,
            headers: google_headers(&config.api_key),
            body: Value::Object(obj),
            stream,
        })
    }

    fn parse_event(&self, frame: &Value) -> Vec<StreamEvent> {
        if frame.get("error").is_some_and(|e| !e.is_null()) {
            let message = extract_error_message(frame).unwrap_or_else(|| "provider reported an error".into());
            return vec![StreamEvent::error(StreamErrorKind::Provider, message)];
        }
        let response = match GeminiResponse::deserialize(frame) {
            Ok(response) => response,
            Err(err) => return vec![StreamEvent::malformed(format!("unexpected chunk shape: {err}"))],
        };

        let parsed = response.into_parsed();
        let mut events = Vec::new();
        if !parsed.text.is_empty() {
            events.push(StreamEvent::ContentDelta { text: parsed.text });
        }
        // Calls arrive whole and without ids; the aggregator assigns them.
        for call in parsed.calls {
            events.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                index: None,
                id: None,
                name: Some(call.name),
                arguments: Some(call.arguments),
            }));
        }
        if let Some(usage) = parsed.usage {
            events.push(StreamEvent::Usage(usage));
        }
        if let Some(reason) = parsed.blocked {
            events.push(StreamEvent::error(
                StreamErrorKind::Provider,
                format!("response blocked ({reason})"),
            ));
        }
        events
    }

    fn parse_final_response(&self, body: &Value) -> Result<FinalResponse> {
        if let Some(message) = body
            .get("error")
            .filter(|e| !e.is_null())
            .and_then(|_| extract_error_message(body))
        {
            return Err(TalkwireError::Provider(message));
        }
        let response = GeminiResponse::deserialize(body)
            .map_err(|e| TalkwireError::MalformedFrame(e.to_string()))?;
        let parsed = response.into_parsed();
        if let Some(reason) = parsed.blocked {
            return Err(TalkwireError::Provider(format!("response blocked ({reason})")));
        }
        Ok(FinalResponse {
            content: parsed.text,
            tool_calls: parsed.calls,
            usage: parsed.usage.unwrap_or_default(),
        })
    }
}

// Internal Gemini response types

struct ParsedChunk {
    text: String,
    calls: Vec<ToolCall>,
    usage: Option<Usage>,
    blocked: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsage>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

impl GeminiResponse {
    fn into_parsed(self) -> ParsedChunk {
        let mut text = String::new();
        let mut calls = Vec::new();
        let mut blocked = self.prompt_feedback.and_then(|f| f.block_reason);

        if let Some(candidate) = self.candidates.unwrap_or_default().into_iter().next() {
            for part in candidate.content.and_then(|c| c.parts).unwrap_or_default() {
                if part.thought.unwrap_or(false) {
                    continue;
                }
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(fc) = part.function_call {
                    let arguments = fc.args.unwrap_or_else(|| json!({})).to_string();
                    calls.push(ToolCall::new(String::new(), fc.name, arguments));
                }
            }
            if blocked.is_none() && text.is_empty() && calls.is_empty() {
                blocked = candidate
                    .finish_reason
                    .filter(|r| BLOCKED_REASONS.contains(&r.as_str()));
            }
        }

        ParsedChunk {
            text,
            calls,
            usage: self
                .usage_metadata
                .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count)),
            blocked,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
    thought: Option<bool>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    args: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default, deserialize_with = "null_as_default")]
    prompt_token_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResponse;
    use pretty_assertions::assert_eq;

    fn config() -> ProviderConfig {
        ProviderConfig::builder()
            .kind(ProviderKind::Google)
            .model("gemini-2.5-flash")
            .api_key("g-key")
            .max_tokens(256)
            .system_prompt("Answer in French.")
            .build()
    }

    #[test]
    fn builds_stream_and_buffered_urls() {
        let conversation = Conversation::with_messages(vec![Message::user("salut")]);
        let streamed = GoogleAdapter.build_request(&conversation, &config(), &[], true).unwrap();
        assert_eq!(
            streamed.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(streamed.headers["x-goog-api-key"], "g-key");
        assert_eq!(streamed.body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(
            streamed.body["systemInstruction"],
            json!({"parts": [{"text": "Answer in French."}]})
        );

        let buffered = GoogleAdapter.build_request(&conversation, &config(), &[], false).unwrap();
        assert!(buffered.url.ends_with("gemini-2.5-flash:generateContent"));
    }

    #[test]
    fn maps_roles_and_tool_results() {
        let conversation = Conversation::with_messages(vec![
            Message::user("weather in Lyon?"),
            Message::assistant_with_tool_calls("", vec![ToolCall::new("call_0", "weather", r#"{"city":"Lyon"}"#)]),
            Message::tool(
                ToolResponse {
                    tool_call_id: "call_0".into(),
                    tool_name: "weather".into(),
                    is_error: false,
                },
                "12C",
                vec![],
            ),
        ]);
        let request = GoogleAdapter.build_request(&conversation, &config(), &[], true).unwrap();
        let contents = request.body["contents"].as_array().unwrap();

        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            contents[1]["parts"][0]["functionCall"],
            json!({"name": "weather", "args": {"city": "Lyon"}})
        );
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["content"],
            "12C"
        );
    }

    #[test]
    fn audio_attachment_is_inlined() {
        let audio = TypedData::new("audio/ogg", vec![9u8, 9], "memo.ogg");
        let conversation =
            Conversation::with_messages(vec![Message::user_with_attachments("", vec![audio])]);
        let request = GoogleAdapter.build_request(&conversation, &config(), &[], true).unwrap();
        assert_eq!(
            request.body["contents"][0]["parts"],
            json!([{"inlineData": {"mimeType": "audio/ogg", "data": "CQk="}}])
        );
    }

    #[test]
    fn parses_text_calls_and_usage() {
        let frame = json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "Looking"},
                {"functionCall": {"name": "weather", "args": {"city": "Lyon"}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 3, "totalTokenCount": 11}
        });
        assert_eq!(
            GoogleAdapter.parse_event(&frame),
            vec![
                StreamEvent::content("Looking"),
                StreamEvent::ToolCallDelta(ToolCallDelta {
                    index: None,
                    id: None,
                    name: Some("weather".into()),
                    arguments: Some(r#"{"city":"Lyon"}"#.into()),
                }),
                StreamEvent::Usage(Usage::new(8, 3)),
            ]
        );
    }

    #[test]
    fn safety_block_is_provider_error() {
        let frame = json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert_eq!(
            GoogleAdapter.parse_event(&frame),
            vec![StreamEvent::error(StreamErrorKind::Provider, "response blocked (SAFETY)")]
        );
        let err = GoogleAdapter.parse_final_response(&frame).unwrap_err();
        assert!(matches!(err, TalkwireError::Provider(_)));
    }

    #[test]
    fn schema_violation_is_malformed() {
        match GoogleAdapter.parse_event(&json!({"candidates": {"oops": 1}})).as_slice() {
            [StreamEvent::Error { kind: StreamErrorKind::Malformed, .. }] => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn null_fields_are_tolerated() {
        let frame = json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "ok", "thought": null}]}, "finishReason": null}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": null},
            "promptFeedback": null
        });
        assert_eq!(
            GoogleAdapter.parse_event(&frame),
            vec![StreamEvent::content("ok"), StreamEvent::Usage(Usage::new(4, 0))]
        );
    }
}
