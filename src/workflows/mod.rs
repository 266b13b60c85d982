//! Request execution. The router decides the plan; these run it against
//! the backend and produce the client's response.

pub mod passthrough;
pub mod translate;

use crate::adapters::{BackendRequest, BackendResponse, Operation};
use crate::error::{BrokerError, Result};
use crate::router::{Execution, ExecutionPlan};

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;

/// Run a routed request. Errors are rendered by the caller in the client's
/// protocol.
pub async fn execute(
    http: &reqwest::Client,
    plan: &ExecutionPlan,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response> {
    match plan.execution {
        Execution::Passthrough { .. } => passthrough::run(http, plan, headers, body).await,
        Execution::Translation { client, backend } => match plan.operation {
            Operation::Chat => translate::chat(http, &plan.model, client, backend, &body).await,
            Operation::Embeddings => {
                translate::embeddings(http, &plan.model, client, backend, &body).await
            }
        },
    }
}

/// Send a fully encoded request and buffer the whole response.
pub(crate) async fn send(http: &reqwest::Client, req: BackendRequest) -> Result<BackendResponse> {
    let BackendRequest { url, headers, body } = req;

    let response = http
        .post(&url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| BrokerError::backend_unavailable(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(|e| {
        BrokerError::backend_unavailable(format!("failed to read response from {url}: {e}"))
    })?;

    Ok(BackendResponse {
        status,
        headers,
        body,
    })
}

pub(crate) fn json_response(status: StatusCode, body: Bytes) -> Result<Response> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(|e| BrokerError::encode(e.to_string()))
}
