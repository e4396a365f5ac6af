//! # Remote Forwarder
//!
//! Sends a query to the node that owns the key and classifies what comes
//! back. One attempt per request, bounded by the configured timeout (60 s by
//! default). A request that runs out of time is dropped on our side; the
//! peer is not told.

use crate::api::ErrorEnvelope;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use shardgate_core::primitives::FORWARDED_BY_HEADER;
use shardgate_core::{NodeAddress, Record, RecordKey, ShardgateError};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of one forwarded request.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// The peer answered with a record (or, for lists, an array of them).
    Found(Record),
    /// The peer answered with a not-found envelope.
    NotFound,
    /// No connection could be made.
    Unreachable(String),
    /// The exchange did not finish within the timeout.
    Timeout,
    /// The peer answered with something that is not a usable body.
    DecodeError(String),
}

/// A forwarded request that produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    #[error("peer has no value for the key")]
    NotFound,
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("peer did not answer in time")]
    Timeout,
    #[error("undecodable peer response: {0}")]
    Decode(String),
}

impl RemoteFailure {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "remote_not_found",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout => "timeout",
            Self::Decode(_) => "decode_error",
        }
    }
}

impl ForwardOutcome {
    pub fn into_result(self) -> Result<Record, RemoteFailure> {
        match self {
            Self::Found(record) => Ok(record),
            Self::NotFound => Err(RemoteFailure::NotFound),
            Self::Unreachable(reason) => Err(RemoteFailure::Unreachable(reason)),
            Self::Timeout => Err(RemoteFailure::Timeout),
            Self::DecodeError(reason) => Err(RemoteFailure::Decode(reason)),
        }
    }
}

/// JSON shape a successful response must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Object,
    Array,
}

/// Classify a peer's response body.
///
/// An error envelope whose status starts with `404` is a plain miss; any
/// other envelope, a non-JSON body, a non-success status without an
/// envelope, or JSON of the wrong shape is a decode error.
pub fn decode_response(status: StatusCode, body: &[u8], expect: Expect) -> ForwardOutcome {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            return ForwardOutcome::DecodeError(format!("HTTP {} with non-JSON body: {}", status, e));
        }
    };

    if let Ok(envelope) = serde_json::from_value::<ErrorEnvelope>(value.clone()) {
        if envelope.status.starts_with("404") {
            return ForwardOutcome::NotFound;
        }
        return ForwardOutcome::DecodeError(format!(
            "peer error {}: {}",
            envelope.status, envelope.message
        ));
    }

    if !status.is_success() {
        return ForwardOutcome::DecodeError(format!("peer answered HTTP {}", status));
    }

    match (expect, &value) {
        (Expect::Object, serde_json::Value::Object(_)) | (Expect::Array, serde_json::Value::Array(_)) => {
            ForwardOutcome::Found(Record(value))
        }
        _ => ForwardOutcome::DecodeError(format!("expected a JSON {:?}", expect).to_lowercase()),
    }
}

// =============================================================================
// FORWARDER
// =============================================================================

/// Sends queries to peers.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// `GET /{resource}/{key}` on `owner`.
    async fn forward_get(&self, owner: &NodeAddress, resource: &str, key: &RecordKey) -> ForwardOutcome;

    /// `GET /{resource}?scope=local` on `owner`.
    async fn forward_list(&self, owner: &NodeAddress, resource: &str) -> ForwardOutcome;
}

/// Forwarder speaking the node's own HTTP API.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    http: reqwest::Client,
    self_address: NodeAddress,
    api_key: Option<String>,
}

impl HttpForwarder {
    /// Client with a whole-exchange `timeout`. `api_key` is sent as a Bearer
    /// token when the cluster shares one.
    pub fn new(
        self_address: NodeAddress,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, ShardgateError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShardgateError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            self_address,
            api_key,
        })
    }

    /// Build a forwarded GET with the loop-guard header and optional Bearer auth.
    fn request(&self, url: Url) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(url)
            .header(FORWARDED_BY_HEADER, self.self_address.to_string());
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn fetch(&self, req: reqwest::RequestBuilder, expect: Expect) -> ForwardOutcome {
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return classify_transport(&e),
        };
        let status = resp.status();
        match resp.bytes().await {
            Ok(body) => decode_response(status, &body, expect),
            Err(e) => classify_transport(&e),
        }
    }
}

/// URL on `owner` for the given path segments.
///
/// Keys arrive percent-decoded from our own router, so every segment is
/// encoded again here; `/`, `%`, `?` and `#` stay inside their segment.
pub fn peer_url(owner: &NodeAddress, segments: &[&str]) -> Result<Url, String> {
    let mut url = Url::parse(&owner.base_url())
        .map_err(|e| format!("bad peer address {}: {}", owner, e))?;
    url.path_segments_mut()
        .map_err(|()| format!("peer address {} cannot carry a path", owner))?
        .clear()
        .extend(segments);
    Ok(url)
}

fn classify_transport(e: &reqwest::Error) -> ForwardOutcome {
    if e.is_timeout() {
        ForwardOutcome::Timeout
    } else {
        ForwardOutcome::Unreachable(e.to_string())
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward_get(&self, owner: &NodeAddress, resource: &str, key: &RecordKey) -> ForwardOutcome {
        let url = match peer_url(owner, &[resource, key.as_str()]) {
            Ok(url) => url,
            Err(e) => return ForwardOutcome::Unreachable(e),
        };
        self.fetch(self.request(url), Expect::Object).await
    }

    async fn forward_list(&self, owner: &NodeAddress, resource: &str) -> ForwardOutcome {
        let url = match peer_url(owner, &[resource]) {
            Ok(url) => url,
            Err(e) => return ForwardOutcome::Unreachable(e),
        };
        let req = self.request(url).query(&[("scope", "local")]);
        self.fetch(req, Expect::Array).await
    }
}
