//! Error types for the broker.

use crate::adapters::{Adapter, Operation, ProtocolType};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BrokerError {
    #[error("unsupported endpoint: {path}")]
    UnknownEndpoint { path: String },

    #[error("failed to parse request body: {message}")]
    BodyParse { message: String },

    #[error("model not supported: {alias}")]
    UnknownModel { alias: String },

    #[error("{protocol} protocol does not support {operation}")]
    UnsupportedOperation {
        protocol: ProtocolType,
        operation: Operation,
    },

    #[error("encode error: {message}")]
    Encode { message: String },

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// The backend answered with an error status. `body` is already in the
    /// client's native error shape.
    #[error("backend returned status {status}")]
    Backend { status: StatusCode, body: Bytes },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BrokerError {
    pub fn body_parse(msg: impl Into<String>) -> Self {
        Self::BodyParse {
            message: msg.into(),
        }
    }

    pub fn unknown_model(alias: impl Into<String>) -> Self {
        Self::UnknownModel {
            alias: alias.into(),
        }
    }

    pub fn unsupported(protocol: ProtocolType, operation: Operation) -> Self {
        Self::UnsupportedOperation {
            protocol,
            operation,
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownEndpoint { .. } | Self::UnknownModel { .. } => StatusCode::NOT_FOUND,
            Self::BodyParse { .. } | Self::UnsupportedOperation { .. } => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Self::Backend { status, .. } => *status,
            Self::Encode { .. }
            | Self::Decode { .. }
            | Self::Config { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind, used as the `type` of rendered error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownEndpoint { .. } => "unknown_endpoint",
            Self::BodyParse { .. } => "invalid_request_error",
            Self::UnknownModel { .. } => "model_not_found",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::Encode { .. } | Self::Decode { .. } => "translation_error",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::Backend { .. } => "backend_error",
            Self::Config { .. } | Self::Io(_) | Self::Json(_) | Self::Toml(_) => "broker_error",
        }
    }

    /// Render this error for a client speaking the given adapter's protocol.
    /// Without an adapter the body is plain text.
    pub fn into_client_response(self, adapter: Option<&dyn Adapter>) -> Response {
        let status = self.status_code();
        let body = match (self, adapter) {
            (Self::Backend { body, .. }, _) => body,
            (err, Some(adapter)) => adapter.error_body(err.kind(), &err.to_string()),
            (err, None) => {
                return (status, err.to_string()).into_response();
            }
        };

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        self.into_client_response(None)
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            BrokerError::unknown_model("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BrokerError::body_parse("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BrokerError::backend_unavailable("refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            BrokerError::decode("bad").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BrokerError::unsupported(ProtocolType::Anthropic, Operation::Embeddings).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_backend_error_preserves_status() {
        let err = BrokerError::Backend {
            status: StatusCode::UNAUTHORIZED,
            body: Bytes::from_static(b"{}"),
        };
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unsupported_message() {
        let err = BrokerError::unsupported(ProtocolType::Anthropic, Operation::Embeddings);
        assert_eq!(
            err.to_string(),
            "anthropic protocol does not support embeddings"
        );
    }
}
