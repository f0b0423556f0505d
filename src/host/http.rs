//! HTTP routes for the host hooks and the RPC surface
//!
//! Merged into the health server's router so everything is served from one
//! port. The in-process tick driver expires matches on its own; the tick
//! route lets an external host loop drive the same check.

use crate::error::{as_allocator_error, AllocatorError};
use crate::host::adapter::HostAdapter;
use crate::host::rpc::RpcError;
use crate::lifecycle::MatchManager;
use crate::metrics::MetricsCollector;
use crate::types::Presence;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct HostApiState {
    pub adapter: HostAdapter,
    pub manager: Arc<MatchManager>,
    pub metrics_collector: Arc<MetricsCollector>,
}

/// Routes for match hooks, lookups and RPC calls
pub fn host_router(state: HostApiState) -> Router {
    Router::new()
        .route("/rpc/{name}", post(rpc_handler))
        .route("/matches", post(create_match_handler))
        .route(
            "/matches/{match_id}",
            get(get_match_handler).delete(terminate_handler),
        )
        .route("/matches/{match_id}/join", post(join_handler))
        .route("/matches/{match_id}/tick", post(tick_handler))
        .route("/pool", get(pool_handler))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn allocator_error_response(err: &anyhow::Error) -> Response {
    match as_allocator_error(err) {
        Some(e @ AllocatorError::NoAvailableServer) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.rpc_message())
        }
        Some(e @ AllocatorError::MatchNotFound { .. }) => {
            error_response(StatusCode::NOT_FOUND, e.rpc_message())
        }
        Some(e @ AllocatorError::DuplicateMatch { .. }) => {
            error_response(StatusCode::CONFLICT, e.rpc_message())
        }
        Some(e @ AllocatorError::InvalidPayload { .. }) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Some(e) => {
            error!("Request failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.rpc_message())
        }
        None => {
            error!("Request failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

async fn rpc_handler(
    State(state): State<HostApiState>,
    Path(name): Path<String>,
    body: String,
) -> Response {
    debug!("RPC {} requested over HTTP", name);

    let result = state.adapter.rpc(&name, &body);
    state
        .metrics_collector
        .record_rpc(&name, result.is_ok());

    match result {
        Ok(payload) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            payload,
        )
            .into_response(),
        Err(e @ RpcError::UnknownProcedure { .. }) => {
            error_response(StatusCode::NOT_FOUND, &e.message())
        }
        Err(e @ RpcError::InvalidPayload { .. }) => {
            error_response(StatusCode::BAD_REQUEST, &e.message())
        }
        Err(e @ RpcError::Failed { .. }) => {
            let status = if e.message() == "Match not found" {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, &e.message())
        }
    }
}

async fn create_match_handler(State(state): State<HostApiState>, body: String) -> Response {
    match state.adapter.matchmaker_matched(&body) {
        Ok(match_id) => (StatusCode::CREATED, Json(json!({ "match_id": match_id }))).into_response(),
        Err(e) => allocator_error_response(&e),
    }
}

async fn join_handler(
    State(state): State<HostApiState>,
    Path(match_id): Path<String>,
    Json(presence): Json<Presence>,
) -> Response {
    match state.adapter.match_join_attempt(&match_id, &presence) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => allocator_error_response(&e),
    }
}

/// Body is the loop state last returned for this match; `state` is null
/// once the match has been torn down
async fn tick_handler(
    State(state): State<HostApiState>,
    Path(match_id): Path<String>,
    Json(loop_state): Json<Value>,
) -> Response {
    if loop_state.get("match_id").and_then(Value::as_str) != Some(match_id.as_str()) {
        return error_response(StatusCode::BAD_REQUEST, "State belongs to another match");
    }

    match state.adapter.match_loop(loop_state) {
        Ok(next) => (StatusCode::OK, Json(json!({ "state": next }))).into_response(),
        Err(e) => allocator_error_response(&e),
    }
}

async fn terminate_handler(
    State(state): State<HostApiState>,
    Path(match_id): Path<String>,
) -> Response {
    match state.adapter.match_terminate(&match_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => allocator_error_response(&e),
    }
}

async fn get_match_handler(
    State(state): State<HostApiState>,
    Path(match_id): Path<String>,
) -> Response {
    match state.manager.get_match(&match_id) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Match not found"),
        Err(e) => allocator_error_response(&e),
    }
}

async fn pool_handler(State(state): State<HostApiState>) -> Response {
    match state.manager.pool_snapshot() {
        Ok(slots) => (StatusCode::OK, Json(json!({ "slots": slots }))).into_response(),
        Err(e) => allocator_error_response(&e),
    }
}
