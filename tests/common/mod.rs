//! Shared test helpers and a scripted transport.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use talkwire::config::ProviderConfig;
use talkwire::error::{Result, TalkwireError};
use talkwire::models::ProviderKind;
use talkwire::provider::{Transport, TransportResponse, WireRequest};

/// One canned response.
#[derive(Debug, Clone)]
pub struct Script {
    pub status: u16,
    pub chunks: Vec<Vec<u8>>,
    /// Keep the body open after the last chunk instead of ending it.
    pub hang: bool,
}

impl Script {
    pub fn ok(chunks: Vec<String>) -> Self {
        Self {
            status: 200,
            chunks: chunks.into_iter().map(String::into_bytes).collect(),
            hang: false,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            chunks: vec![body.as_bytes().to_vec()],
            hang: false,
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// Transport that replays queued scripts in order and records every
/// request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &WireRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TalkwireError::TransportMessage("no scripted response left".into()))?;

        let chunks = futures::stream::iter(script.chunks.into_iter().map(Ok));
        let body = if script.hang {
            chunks.chain(futures::stream::pending()).boxed()
        } else {
            chunks.boxed()
        };
        Ok(TransportResponse::new(script.status, body))
    }
}

pub fn openai_config() -> ProviderConfig {
    ProviderConfig::builder()
        .kind(ProviderKind::OpenAi)
        .model("gpt-4o")
        .api_key("sk-test".to_string())
        .build()
}

/// `data: {json}\n\n`
pub fn sse(value: Value) -> String {
    format!("data: {value}\n\n")
}

pub fn sse_done() -> String {
    "data: [DONE]\n\n".to_string()
}

/// An OpenAI chunk carrying one text delta.
pub fn text_chunk(text: &str) -> String {
    sse(json!({"choices": [{"index": 0, "delta": {"content": text}}]}))
}

/// An OpenAI chunk carrying a tool-call fragment.
pub fn tool_chunk(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> String {
    let mut call = json!({"index": index, "function": {"arguments": arguments}});
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    if let Some(name) = name {
        call["function"]["name"] = json!(name);
    }
    sse(json!({"choices": [{"index": 0, "delta": {"tool_calls": [call]}}]}))
}

pub fn usage_chunk(input: u32, output: u32) -> String {
    sse(json!({"choices": [], "usage": {"prompt_tokens": input, "completion_tokens": output}}))
}

/// A full streamed text reply.
pub fn text_reply(parts: &[&str]) -> Script {
    let mut chunks: Vec<String> = parts.iter().map(|p| text_chunk(p)).collect();
    chunks.push(sse_done());
    Script::ok(chunks)
}
