//! Provider adapters: request serialization and stream-event parsing.
//!
//! Each wire-format family implements [`ProviderAdapter`]. Adapters are pure:
//! they build a [`WireRequest`] from a conversation and turn decoded JSON
//! frames into normalized [`StreamEvent`]s. Sending bytes is the job of a
//! [`Transport`].

pub(crate) mod format;
pub mod http;

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use http::{HttpTransport, Transport, TransportResponse};
pub use openai::OpenAiAdapter;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::models::{ProviderFamily, ProviderKind};
use crate::stream::Framing;
use crate::types::{Conversation, StreamEvent, ToolCall, ToolCallDelta, Usage};

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A fully built HTTP request, ready for a [`Transport`].
#[derive(Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
    pub stream: bool,
}

impl std::fmt::Debug for WireRequest {
    // Headers carry credentials.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireRequest")
            .field("url", &self.url)
            .field("body", &self.body)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// A complete non-streamed reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl FinalResponse {
    /// Replay the response as stream events so buffered and streamed
    /// replies share the aggregator.
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(self.tool_calls.len() + 3);
        if !self.content.is_empty() {
            events.push(StreamEvent::content(self.content));
        }
        for (index, call) in self.tool_calls.into_iter().enumerate() {
            events.push(StreamEvent::ToolCallDelta(ToolCallDelta {
                index: Some(index),
                id: Some(call.id).filter(|id| !id.is_empty()),
                name: Some(call.name),
                arguments: Some(call.arguments),
            }));
        }
        if !self.usage.is_empty() {
            events.push(StreamEvent::Usage(self.usage));
        }
        events.push(StreamEvent::Done);
        events
    }
}

/// Translation between the normalized model and one provider wire format.
pub trait ProviderAdapter: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// How the streamed body is framed.
    fn framing(&self) -> Framing {
        Framing::Sse
    }

    /// Serialize the sendable part of `conversation`.
    ///
    /// Fails with `UnsupportedContent` when an attachment cannot be
    /// represented for the configured model.
    fn build_request(
        &self,
        conversation: &Conversation,
        config: &ProviderConfig,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<WireRequest>;

    /// Map one decoded frame to zero or more events.
    ///
    /// Pure: the same frame always yields the same events.
    fn parse_event(&self, frame: &Value) -> Vec<StreamEvent>;

    /// Parse the body of a non-streamed reply.
    fn parse_final_response(&self, body: &Value) -> Result<FinalResponse>;
}

/// The adapter for a provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    OpenAiCompatible(OpenAiAdapter),
    Anthropic(AnthropicAdapter),
    Google(GoogleAdapter),
}

impl Adapter {
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind.family() {
            ProviderFamily::OpenAiCompatible => Self::OpenAiCompatible(OpenAiAdapter::new(kind)),
            ProviderFamily::Anthropic => Self::Anthropic(AnthropicAdapter),
            ProviderFamily::Google => Self::Google(GoogleAdapter),
        }
    }

    fn inner(&self) -> &dyn ProviderAdapter {
        match self {
            Self::OpenAiCompatible(adapter) => adapter,
            Self::Anthropic(adapter) => adapter,
            Self::Google(adapter) => adapter,
        }
    }
}

impl ProviderAdapter for Adapter {
    fn family(&self) -> ProviderFamily {
        self.inner().family()
    }

    fn framing(&self) -> Framing {
        self.inner().framing()
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        config: &ProviderConfig,
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<WireRequest> {
        self.inner().build_request(conversation, config, tools, stream)
    }

    fn parse_event(&self, frame: &Value) -> Vec<StreamEvent> {
        self.inner().parse_event(frame)
    }

    fn parse_final_response(&self, body: &Value) -> Result<FinalResponse> {
        self.inner().parse_final_response(body)
    }
}
