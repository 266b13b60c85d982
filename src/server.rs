use crate::adapters::adapter_for;
use crate::error::BrokerError;
use crate::registry::SharedRegistry;
use crate::router::{resolve_endpoint, route};
use crate::workflows;

use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{warn, Instrument};

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub client: reqwest::Client,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_broker))
        .route("/v1/messages", post(handle_broker))
        .route("/v1/embeddings", post(handle_broker))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .fallback(handle_unknown)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_broker(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("broker", %request_id, path = uri.path());
    broker(state, uri.path(), headers, body)
        .instrument(span)
        .await
}

async fn broker(state: Arc<AppState>, path: &str, headers: HeaderMap, body: Bytes) -> Response {
    let client_protocol = match resolve_endpoint(path) {
        Ok((protocol, _)) => protocol,
        Err(e) => return e.into_response(),
    };

    // Pin one snapshot for the whole request; a reload mid-flight doesn't affect it.
    let registry = state.registry.snapshot();
    let plan = match route(path, &body, &registry) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "Routing failed");
            return e.into_client_response(Some(adapter_for(client_protocol)));
        }
    };

    match workflows::execute(&state.client, &plan, &headers, body).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(
                error = %e,
                alias = %plan.model.alias,
                mode = plan.execution.mode(),
                status = e.status_code().as_u16(),
                "Request failed"
            );
            e.into_client_response(Some(plan.execution.client_adapter()))
        }
    }
}

async fn handle_unknown(uri: Uri) -> Response {
    BrokerError::UnknownEndpoint {
        path: uri.path().to_string(),
    }
    .into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let registry = state.registry.snapshot();
    let models: Vec<serde_json::Value> = registry
        .models()
        .map(|model| {
            serde_json::json!({
                "id": model.alias,
                "object": "model",
                "owned_by": model.protocol.as_str(),
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}
