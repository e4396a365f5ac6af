//! # API Endpoint Handlers
//!
//! Thin adapters between axum extractors and the [`QueryRouter`]. All routing
//! decisions happen in the router; handlers only pick the origin, call it and
//! format the outcome.
//!
//! [`QueryRouter`]: crate::router::QueryRouter

use super::{
    AppState,
    types::{HealthResponse, ListQuery, OwnersResponse},
};
use crate::router::{Origin, RouteError, Served};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use shardgate_core::primitives::FORWARDED_BY_HEADER;

fn origin_of(headers: &HeaderMap) -> Origin {
    if headers.contains_key(FORWARDED_BY_HEADER) {
        Origin::Peer
    } else {
        Origin::Client
    }
}

/// Extractor rejections are answered with the error envelope like any
/// other failure.
fn rejected(state: &AppState, reason: String) -> Response {
    tracing::info!(outcome = "bad_request", "Rejected request: {}", reason);
    state.policy.render(&RouteError::BadRequest { reason })
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint. 200 once the node has settled after a rebalance.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let live = state.liveness.is_live();
    let code = if live {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(HealthResponse::new(live, state.router.runtime_state())))
}

// =============================================================================
// RESOURCE HANDLERS
// =============================================================================

/// `GET /{resource}`
pub async fn list_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let Path(resource) = match path {
        Ok(path) => path,
        Err(e) => return rejected(&state, e.body_text()),
    };
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return rejected(&state, e.body_text()),
    };
    let origin = origin_of(&headers);
    match state.router.handle_list(&resource, query.scope, origin).await {
        Ok(records) => {
            tracing::debug!(resource = %resource, count = records.len(), scope = ?query.scope, "Listed records");
            let items: Vec<Value> = records.into_iter().map(|r| r.0).collect();
            (StatusCode::OK, Json(Value::Array(items))).into_response()
        }
        Err(e) => {
            tracing::info!(resource = %resource, outcome = e.kind(), "List failed: {}", e);
            state.policy.render(&e)
        }
    }
}

/// `GET /{resource}/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let Path((resource, id)) = match path {
        Ok(path) => path,
        Err(e) => return rejected(&state, e.body_text()),
    };
    let origin = origin_of(&headers);
    match state.router.handle_get(&resource, &id, origin).await {
        Ok(routed) => {
            match &routed.served {
                Served::Local => tracing::debug!(resource = %resource, id = %id, "Served locally"),
                Served::Remote(owner) => {
                    tracing::debug!(resource = %resource, id = %id, owner = %owner, "Served by owner")
                }
            }
            (StatusCode::OK, Json(routed.record)).into_response()
        }
        Err(e) => {
            tracing::info!(resource = %resource, id = %id, outcome = e.kind(), "Lookup failed: {}", e);
            state.policy.render(&e)
        }
    }
}

// =============================================================================
// METADATA HANDLERS
// =============================================================================

/// `GET /_meta/{resource}`
pub async fn owners_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    let Path(resource) = match path {
        Ok(path) => path,
        Err(e) => return rejected(&state, e.body_text()),
    };
    match state.router.owners(&resource) {
        Ok(owners) => {
            let store = state
                .router
                .resources()
                .get(&resource)
                .map(|spec| spec.store.clone())
                .unwrap_or_default();
            let body = OwnersResponse {
                resource,
                store,
                owners,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => state.policy.render(&e),
    }
}

/// `GET /_meta/{resource}/{id}`
pub async fn key_metadata_handler(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Response {
    let Path((resource, id)) = match path {
        Ok(path) => path,
        Err(e) => return rejected(&state, e.body_text()),
    };
    match state.router.describe(&resource, &id) {
        Ok(meta) => (StatusCode::OK, Json(meta)).into_response(),
        Err(e) => state.policy.render(&e),
    }
}
