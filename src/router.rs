//! Request routing: path → (client protocol, operation), body → model alias,
//! alias → target, and the choice between passthrough and translation.

use crate::adapters::{adapter_for, Adapter, Operation, ProtocolType};
use crate::error::{BrokerError, Result};
use crate::registry::{Model, ModelRegistry};

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Client protocol and operation implied by a request path.
pub fn resolve_endpoint(path: &str) -> Result<(ProtocolType, Operation)> {
    match path {
        "/v1/chat/completions" => Ok((ProtocolType::OpenAi, Operation::Chat)),
        "/v1/messages" => Ok((ProtocolType::Anthropic, Operation::Chat)),
        "/v1/embeddings" => Ok((ProtocolType::OpenAi, Operation::Embeddings)),
        _ => Err(BrokerError::UnknownEndpoint {
            path: path.to_string(),
        }),
    }
}

#[derive(Deserialize)]
struct ModelField {
    model: String,
}

/// Read only the `model` field; everything else in the body is left alone.
pub fn extract_model(body: &[u8]) -> Result<String> {
    serde_json::from_slice::<ModelField>(body)
        .map(|m| m.model)
        .map_err(|e| BrokerError::body_parse(e.to_string()))
}

pub enum Execution {
    /// Client and backend speak the same protocol; bytes are relayed.
    Passthrough { adapter: &'static dyn Adapter },
    /// Decode with `client`, re-encode with `backend`, and back.
    Translation {
        client: &'static dyn Adapter,
        backend: &'static dyn Adapter,
    },
}

impl Execution {
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Passthrough { .. } => "passthrough",
            Self::Translation { .. } => "translation",
        }
    }

    /// Adapter whose error shape the client understands.
    #[must_use]
    pub fn client_adapter(&self) -> &'static dyn Adapter {
        match self {
            Self::Passthrough { adapter } => *adapter,
            Self::Translation { client, .. } => *client,
        }
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough { adapter } => f
                .debug_struct("Passthrough")
                .field("protocol", &adapter.protocol())
                .finish(),
            Self::Translation { client, backend } => f
                .debug_struct("Translation")
                .field("client", &client.protocol())
                .field("backend", &backend.protocol())
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct ExecutionPlan {
    pub operation: Operation,
    pub model: Arc<Model>,
    pub execution: Execution,
}

/// Plan a request. Fails before any backend call when the path, body, alias,
/// or operation support rules it out.
pub fn route(path: &str, body: &[u8], registry: &ModelRegistry) -> Result<ExecutionPlan> {
    let (client_protocol, operation) = resolve_endpoint(path)?;
    let alias = extract_model(body)?;
    let model = registry.lookup(&alias)?;

    let execution = if client_protocol == model.protocol {
        Execution::Passthrough {
            adapter: adapter_for(client_protocol),
        }
    } else {
        let client = adapter_for(client_protocol);
        let backend = adapter_for(model.protocol);
        for adapter in [client, backend] {
            if !adapter.supports(operation) {
                return Err(BrokerError::unsupported(adapter.protocol(), operation));
            }
        }
        Execution::Translation { client, backend }
    };

    tracing::debug!(
        alias = %model.alias,
        target_model = %model.target.model,
        provider_type = %model.protocol,
        mode = execution.mode(),
        "Routed request"
    );

    Ok(ExecutionPlan {
        operation,
        model,
        execution,
    })
}
