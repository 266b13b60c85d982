//! Same-protocol relay. The body is forwarded as received except for the
//! `model` field, and the backend's response is streamed back untouched.

use crate::adapters::set_bearer;
use crate::error::{BrokerError, Result};
use crate::router::ExecutionPlan;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use tracing::{info, warn};

pub async fn run(
    http: &reqwest::Client,
    plan: &ExecutionPlan,
    inbound: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let model = &plan.model;
    let body = if model.needs_rewrite() {
        rewrite_model(&body, &model.target.model)?
    } else {
        body
    };

    let url = model.target.endpoint(plan.operation);
    let mut headers = forward_headers(inbound);
    set_bearer(&mut headers, &model.target.api_key);

    let response = http
        .post(&url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| BrokerError::backend_unavailable(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    info!(
        alias = %model.alias,
        target_model = %model.target.model,
        status = status.as_u16(),
        "Passthrough response"
    );

    let mut builder = Response::builder().status(status);
    if let Some(out) = builder.headers_mut() {
        *out = forward_headers(response.headers());
    }

    let stream = response
        .bytes_stream()
        .inspect_err(|e| warn!(error = %e, "Backend stream interrupted"));

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| BrokerError::encode(e.to_string()))
}

/// Replace the top-level `model` value. Key order is preserved.
pub fn rewrite_model(body: &[u8], target_model: &str) -> Result<Bytes> {
    let mut json: Map<String, Value> =
        serde_json::from_slice(body).map_err(|e| BrokerError::body_parse(e.to_string()))?;
    json.insert("model".to_string(), Value::String(target_model.to_string()));
    serde_json::to_vec(&json)
        .map(Bytes::from)
        .map_err(|e| BrokerError::encode(e.to_string()))
}

/// Copy headers minus the connection-scoped ones.
fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    let hop_by_hop: [HeaderName; 8] = [
        header::CONNECTION,
        header::HOST,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::TE,
        header::TRAILER,
        header::UPGRADE,
        header::PROXY_AUTHORIZATION,
    ];

    let mut out = headers.clone();
    for name in hop_by_hop {
        out.remove(name);
    }
    out
}
