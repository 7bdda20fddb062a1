//! HTTP transport, auth headers, and error-body extraction.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use super::WireRequest;
use crate::error::{Result, TalkwireError};

/// Raw response body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Status plus a streaming body.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into memory.
    pub async fn read_all(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends a built request and hands back the body as a byte stream.
///
/// The lifecycle only talks to this seam, so tests can script responses
/// without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with a connect timeout. No total timeout is set since
    /// streamed replies can run for minutes; idle gaps are policed by the
    /// lifecycle instead.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest) -> Result<TransportResponse> {
        tracing::debug!(url = %request.url, stream = request.stream, "sending provider request");
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TalkwireError::from))
            .boxed();
        Ok(TransportResponse::new(status, body))
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Headers for Bearer-token APIs. An empty key sends no Authorization header.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = json_headers();
    if !api_key.is_empty() {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Anthropic-style headers (x-api-key plus a pinned API version).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = json_headers();
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Google Generative Language headers.
pub fn google_headers(api_key: &str) -> HeaderMap {
    let mut headers = json_headers();
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-goog-api-key", val);
    }
    headers
}

/// Pull a human-readable message out of a provider error envelope.
///
/// Understands `{"error":{"message":..}}`, `{"error":".."}`, a top-level
/// `{"message":..}`, and Google's array-wrapped form.
pub fn extract_error_message(value: &Value) -> Option<String> {
    if let Some(items) = value.as_array() {
        return items.iter().find_map(extract_error_message);
    }
    let from_error = value.get("error").and_then(|error| match error {
        Value::String(text) => Some(text.clone()),
        Value::Object(_) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    });
    from_error
        .or_else(|| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Build the error for a non-2xx response.
///
/// Falls back to the trimmed raw body, then to the canonical status reason.
pub fn error_from_body(status: u16, body: &[u8]) -> TalkwireError {
    let text = String::from_utf8_lossy(body);
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|value| extract_error_message(&value))
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| canonical_reason(status));
    TalkwireError::http(status, message)
}

fn canonical_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_of(err: TalkwireError) -> (u16, String) {
        match err {
            TalkwireError::HttpStatus { status, message } => (status, message),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn nested_error_message_is_extracted() {
        let err = error_from_body(429, br#"{"error":{"message":"rate limited","type":"x"}}"#);
        assert_eq!(message_of(err), (429, "rate limited".to_string()));
    }

    #[test]
    fn string_error_and_top_level_message_are_extracted() {
        assert_eq!(
            extract_error_message(&json!({"error": "bad key"})),
            Some("bad key".into())
        );
        assert_eq!(
            extract_error_message(&json!({"message": "  overloaded "})),
            Some("overloaded".into())
        );
    }

    #[test]
    fn google_array_envelope_is_extracted() {
        let body = json!([{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}]);
        assert_eq!(extract_error_message(&body), Some("API key not valid".into()));
    }

    #[test]
    fn raw_body_then_reason_phrase_fallbacks() {
        let (_, message) = message_of(error_from_body(502, b"  upstream exploded\n"));
        assert_eq!(message, "upstream exploded");

        let (_, message) = message_of(error_from_body(503, b""));
        assert_eq!(message, "Service Unavailable");
    }

    #[test]
    fn bearer_headers_skip_empty_key() {
        assert!(bearer_headers("").get(AUTHORIZATION).is_none());
        assert_eq!(
            bearer_headers("sk-1").get(AUTHORIZATION).unwrap(),
            "Bearer sk-1"
        );
    }
}
