//! Protocol adapters: bidirectional codecs between a wire protocol and the
//! unified model.
//!
//! Adapters are pure. They turn bytes into unified values and back, and
//! describe outbound requests as [`BackendRequest`] values; the workflows do
//! the actual I/O.

pub mod anthropic;
pub mod anthropic_types;
pub mod openai;
pub mod openai_types;

use crate::error::{BrokerError, Result};
use crate::unified::{
    UnifiedChatRequest, UnifiedChatResponse, UnifiedEmbeddingRequest, UnifiedEmbeddingResponse,
};

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;

/// Wire protocol spoken by a client or a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ProtocolType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Chat,
    Embeddings,
}

impl Operation {
    /// Path appended to a target's base URL.
    #[must_use]
    pub fn backend_path(self) -> &'static str {
        match self {
            Self::Chat => "chat/completions",
            Self::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => f.write_str("chat"),
            Self::Embeddings => f.write_str("embeddings"),
        }
    }
}

/// An outbound request, fully encoded but not yet sent.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendRequest {
    pub fn json(url: impl Into<String>, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self {
            url: url.into(),
            headers,
            body,
        }
    }

    /// Set `Authorization: Bearer <key>`. Empty keys and keys that are not
    /// valid header values leave the request untouched.
    pub fn bearer_auth(&mut self, api_key: &str) {
        set_bearer(&mut self.headers, api_key);
    }
}

pub(crate) fn set_bearer(headers: &mut HeaderMap, api_key: &str) {
    if api_key.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(header::AUTHORIZATION, value);
    }
}

/// A complete backend response.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }
}

/// Bidirectional codec for one wire protocol.
///
/// Chat is mandatory. Embeddings default to [`BrokerError::UnsupportedOperation`];
/// callers should consult [`Adapter::supports`] before relying on them.
pub trait Adapter: Send + Sync {
    fn protocol(&self) -> ProtocolType;

    fn supports(&self, operation: Operation) -> bool;

    fn decode_client_chat(&self, body: &[u8]) -> Result<UnifiedChatRequest>;
    fn encode_backend_chat(&self, req: &UnifiedChatRequest, url: &str) -> Result<BackendRequest>;
    fn decode_backend_chat(&self, resp: &BackendResponse) -> Result<UnifiedChatResponse>;
    fn encode_client_chat(&self, resp: &UnifiedChatResponse) -> Result<Bytes>;

    fn decode_client_embeddings(&self, _body: &[u8]) -> Result<UnifiedEmbeddingRequest> {
        Err(BrokerError::unsupported(self.protocol(), Operation::Embeddings))
    }

    fn encode_backend_embeddings(
        &self,
        _req: &UnifiedEmbeddingRequest,
        _url: &str,
    ) -> Result<BackendRequest> {
        Err(BrokerError::unsupported(self.protocol(), Operation::Embeddings))
    }

    fn decode_backend_embeddings(&self, _resp: &BackendResponse) -> Result<UnifiedEmbeddingResponse> {
        Err(BrokerError::unsupported(self.protocol(), Operation::Embeddings))
    }

    fn encode_client_embeddings(&self, _resp: &UnifiedEmbeddingResponse) -> Result<Bytes> {
        Err(BrokerError::unsupported(self.protocol(), Operation::Embeddings))
    }

    /// Rewrap a backend error response into this protocol's error shape.
    fn translate_error(&self, resp: &BackendResponse) -> Bytes;

    /// Build a native error body from a kind and a message.
    fn error_body(&self, error_type: &str, message: &str) -> Bytes;
}

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;

/// The adapter instance for a protocol. Adapters are stateless, so one
/// shared instance per protocol serves every request.
#[must_use]
pub fn adapter_for(protocol: ProtocolType) -> &'static dyn Adapter {
    match protocol {
        ProtocolType::OpenAi => &OPENAI,
        ProtocolType::Anthropic => &ANTHROPIC,
    }
}

/// Join a base URL and a relative operation path with exactly one slash.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn to_json_bytes<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| BrokerError::encode(e.to_string()))
}

pub(crate) fn from_client_json<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| BrokerError::decode(format!("invalid client request: {e}")))
}

pub(crate) fn from_backend_json<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        BrokerError::decode(format!(
            "invalid backend response: {e}. Body: {}",
            truncate(&String::from_utf8_lossy(body), 300)
        ))
    })
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
