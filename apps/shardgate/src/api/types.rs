//! # API Request/Response Types
//!
//! JSON bodies of the HTTP API and the policy that turns a [`RouteError`]
//! into a status code and an error envelope.

use crate::forward::RemoteFailure;
use crate::router::{RouteError, Scope};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use shardgate_core::{NodeAddress, RuntimeState, primitives::OUTCOME_HEADER};

// =============================================================================
// ERROR ENVELOPE
// =============================================================================

/// Body of every failed lookup: `{"status": "404 Not Found", "message": "..."}`.
///
/// Unknown fields are rejected so a record that happens to carry `status`
/// and `message` is never mistaken for an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
}

impl ErrorEnvelope {
    /// Envelope with the canonical `"<code> <reason>"` status text.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: code.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// ERROR POLICY
// =============================================================================

/// Which HTTP status a failure is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMode {
    /// The envelope's status is also the response status.
    #[default]
    Http,
    /// Every response is 200; only the envelope tells success from failure.
    AlwaysOk,
}

/// How failed forwards are shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMode {
    /// Indistinguishable from a missing key.
    #[default]
    Collapse,
    /// 502 for unreachable or garbled peers, 504 for timeouts.
    Distinct,
}

/// Error rendering settings, from the `[response]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPolicy {
    #[serde(default)]
    pub status: StatusMode,
    #[serde(default)]
    pub remote: RemoteMode,
}

impl ErrorPolicy {
    /// Status code carried in the envelope.
    #[must_use]
    pub fn code_for(&self, err: &RouteError) -> StatusCode {
        match err {
            RouteError::NotFound { .. }
            | RouteError::Empty { .. }
            | RouteError::UnknownResource { .. }
            | RouteError::UnknownStore { .. } => StatusCode::NOT_FOUND,
            RouteError::InvalidKey { .. } | RouteError::BadRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            RouteError::StoreNotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RouteError::Remote { failure, .. } => match (self.remote, failure) {
                (RemoteMode::Collapse, _) | (RemoteMode::Distinct, RemoteFailure::NotFound) => {
                    StatusCode::NOT_FOUND
                }
                (RemoteMode::Distinct, RemoteFailure::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                (RemoteMode::Distinct, _) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    /// Client-facing message.
    #[must_use]
    pub fn message_for(&self, err: &RouteError) -> String {
        match (self.remote, err) {
            (
                RemoteMode::Distinct,
                RouteError::Remote {
                    singular,
                    id,
                    owner,
                    failure,
                },
            ) => distinct_message(singular, id, owner, failure),
            _ => err.to_string(),
        }
    }

    #[must_use]
    pub fn envelope(&self, err: &RouteError) -> ErrorEnvelope {
        ErrorEnvelope::new(self.code_for(err), self.message_for(err))
    }

    /// Full response: status, outcome header and envelope body.
    #[must_use]
    pub fn render(&self, err: &RouteError) -> Response {
        let code = self.code_for(err);
        let http_status = match self.status {
            StatusMode::Http => code,
            StatusMode::AlwaysOk => StatusCode::OK,
        };
        let envelope = ErrorEnvelope::new(code, self.message_for(err));
        (http_status, [(OUTCOME_HEADER, err.kind())], Json(envelope)).into_response()
    }
}

fn distinct_message(singular: &str, id: &str, owner: &NodeAddress, failure: &RemoteFailure) -> String {
    match failure {
        RemoteFailure::NotFound => {
            format!("Failed to retrieve value for {} with id: {}", singular, id)
        }
        RemoteFailure::Timeout => format!(
            "Owner {} did not answer in time for {} with id: {}",
            owner, singular, id
        ),
        RemoteFailure::Unreachable(_) => format!(
            "Owner {} is unreachable for {} with id: {}",
            owner, singular, id
        ),
        RemoteFailure::Decode(_) => format!(
            "Owner {} sent an unreadable response for {} with id: {}",
            owner, singular, id
        ),
    }
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub live: bool,
    pub state: RuntimeState,
}

impl HealthResponse {
    #[must_use]
    pub fn new(live: bool, state: RuntimeState) -> Self {
        Self {
            status: if live { "UP" } else { "DOWN" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            live,
            state,
        }
    }
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// `GET /{resource}?scope=local|cluster`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub scope: Scope,
}

// =============================================================================
// ADMIN RESPONSES
// =============================================================================

/// `GET /_meta/{resource}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnersResponse {
    pub resource: String,
    pub store: String,
    pub owners: Vec<NodeAddress>,
}
