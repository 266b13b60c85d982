//! Cross-protocol pipeline: decode with the client adapter, re-encode for the
//! backend, send, and map the answer back.

use super::{json_response, send};
use crate::adapters::{Adapter, BackendResponse, Operation};
use crate::error::{BrokerError, Result};
use crate::registry::Model;

use axum::response::Response;
use tracing::{debug, info, warn};

pub async fn chat(
    http: &reqwest::Client,
    model: &Model,
    client: &dyn Adapter,
    backend: &dyn Adapter,
    body: &[u8],
) -> Result<Response> {
    let mut req = client.decode_client_chat(body)?;
    req.model.clone_from(&model.target.model);
    // Responses are translated whole.
    req.stream = false;

    let mut outbound = backend.encode_backend_chat(&req, &model.target.endpoint(Operation::Chat))?;
    outbound.bearer_auth(&model.target.api_key);

    debug!(url = %outbound.url, messages = req.messages.len(), "Sending translated chat request");
    let resp = send(http, outbound).await?;
    check_status(model, client, &resp)?;

    let unified = backend.decode_backend_chat(&resp)?;
    info!(
        alias = %model.alias,
        target_model = %model.target.model,
        status = resp.status.as_u16(),
        input_tokens = unified.usage.input_tokens,
        output_tokens = unified.usage.output_tokens,
        "Translated chat completed"
    );

    json_response(resp.status, client.encode_client_chat(&unified)?)
}

pub async fn embeddings(
    http: &reqwest::Client,
    model: &Model,
    client: &dyn Adapter,
    backend: &dyn Adapter,
    body: &[u8],
) -> Result<Response> {
    let mut req = client.decode_client_embeddings(body)?;
    req.model.clone_from(&model.target.model);

    let mut outbound =
        backend.encode_backend_embeddings(&req, &model.target.endpoint(Operation::Embeddings))?;
    outbound.bearer_auth(&model.target.api_key);

    let resp = send(http, outbound).await?;
    check_status(model, client, &resp)?;

    let unified = backend.decode_backend_embeddings(&resp)?;
    if unified.embeddings.len() != req.input.len() {
        return Err(BrokerError::decode(format!(
            "backend returned {} embeddings for {} inputs",
            unified.embeddings.len(),
            req.input.len()
        )));
    }

    info!(
        alias = %model.alias,
        target_model = %model.target.model,
        status = resp.status.as_u16(),
        vectors = unified.embeddings.len(),
        "Translated embeddings completed"
    );

    json_response(resp.status, client.encode_client_embeddings(&unified)?)
}

/// Error statuses keep their code; the body is rewrapped for the client.
fn check_status(model: &Model, client: &dyn Adapter, resp: &BackendResponse) -> Result<()> {
    if !resp.is_error() {
        return Ok(());
    }

    warn!(
        alias = %model.alias,
        status = resp.status.as_u16(),
        body = %crate::adapters::truncate(&String::from_utf8_lossy(&resp.body), 300),
        "Backend returned an error"
    );

    Err(BrokerError::Backend {
        status: resp.status,
        body: client.translate_error(resp),
    })
}
