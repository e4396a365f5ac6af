//! Integration tests for the shardgate HTTP API.
//!
//! Uses axum-test against a real runtime and in-memory shard. Peers are
//! replaced by a scripted forwarder so every remote outcome can be produced
//! on demand and forward calls can be counted.

#![allow(clippy::unwrap_used, clippy::panic)]

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use serde_json::{Value, json};
use shardgate::api::{
    AppState, ErrorEnvelope, ErrorPolicy, HealthResponse, OwnersResponse, RemoteMode,
    ServerSettings, StatusMode, create_router,
};
use shardgate::router::{QueryRouter, ResourceRegistry, default_resources};
use shardgate::{ForwardOutcome, Forwarder};
use shardgate_core::primitives::{FORWARDED_BY_HEADER, OUTCOME_HEADER};
use shardgate_core::{
    Assignment, EmbeddedRuntime, KeyMetadata, LivenessTracker, MemoryShard, MetadataResolver,
    NodeAddress, Record, RecordKey, RuntimeState, ShardStorage, StreamsRuntime, partition_for,
};
use std::sync::{Arc, Mutex};

const PARTITIONS: u32 = 8;

fn me() -> NodeAddress {
    NodeAddress::new("10.0.0.1", 8080)
}

fn peer() -> NodeAddress {
    NodeAddress::new("10.0.0.2", 8080)
}

fn account_json(id: u64) -> Value {
    json!({
        "id": id,
        "owner": format!("owner-{}", id),
        "email": format!("{}@example.com", id),
        "tier": "gold"
    })
}

// =============================================================================
// SCRIPTED FORWARDER
// =============================================================================

/// Answers every forward with the same outcome and remembers who was asked.
struct ScriptedForwarder {
    outcome: ForwardOutcome,
    calls: Mutex<Vec<String>>,
}

impl ScriptedForwarder {
    fn new(outcome: ForwardOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for ScriptedForwarder {
    async fn forward_get(&self, owner: &NodeAddress, resource: &str, key: &RecordKey) -> ForwardOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(format!("GET {}/{}/{}", owner, resource, key));
        self.outcome.clone()
    }

    async fn forward_list(&self, owner: &NodeAddress, resource: &str) -> ForwardOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(format!("LIST {}/{}", owner, resource));
        self.outcome.clone()
    }
}

// =============================================================================
// FIXTURE
// =============================================================================

struct Fixture {
    server: TestServer,
    forwarder: Arc<ScriptedForwarder>,
    runtime: Arc<EmbeddedRuntime>,
}

struct Setup {
    members: Vec<NodeAddress>,
    accounts: Vec<u64>,
    outcome: ForwardOutcome,
    policy: ErrorPolicy,
    settings: ServerSettings,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            members: vec![me()],
            accounts: vec![42],
            outcome: ForwardOutcome::NotFound,
            policy: ErrorPolicy::default(),
            settings: ServerSettings {
                rate_limit: 0,
                ..ServerSettings::default()
            },
        }
    }
}

fn two_nodes() -> Setup {
    Setup {
        members: vec![me(), peer()],
        accounts: (0..40).collect(),
        ..Setup::default()
    }
}

fn build(setup: Setup) -> Fixture {
    let storage = Arc::new(MemoryShard::new());
    for id in &setup.accounts {
        let key = RecordKey::from(*id);
        let bytes = Record(account_json(*id)).to_vec().unwrap();
        storage
            .put("accountStore", partition_for(&key, PARTITIONS), &key, &bytes)
            .unwrap();
    }

    let registry = ResourceRegistry::new(default_resources()).unwrap();
    let runtime = Arc::new(EmbeddedRuntime::new(me(), registry.stores(), storage));
    let liveness = LivenessTracker::new();
    runtime.register_state_listener(Arc::new(liveness.clone()));
    runtime.start(&setup.members, PARTITIONS).unwrap();

    let forwarder = Arc::new(ScriptedForwarder::new(setup.outcome));
    let resolver = MetadataResolver::new(runtime.clone(), me(), PARTITIONS);
    let router = QueryRouter::new(runtime.clone(), resolver, forwarder.clone(), registry);

    let state = AppState::new(Arc::new(router), liveness)
        .with_policy(setup.policy)
        .with_settings(setup.settings);
    Fixture {
        server: TestServer::new(create_router(state)).unwrap(),
        forwarder,
        runtime,
    }
}

/// First id in `0..1000` owned by `owner` in a two-node cluster.
fn id_owned_by(owner: &NodeAddress) -> u64 {
    let assignment = Assignment::round_robin(PARTITIONS, &[me(), peer()]).unwrap();
    (0..1000)
        .find(|id| {
            assignment
                .locate(&RecordKey::from(*id))
                .is_some_and(|(_, o)| o == owner)
        })
        .unwrap()
}

fn outcome_header(response: &axum_test::TestResponse) -> Option<String> {
    response
        .headers()
        .get(OUTCOME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn forwarded_by() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(FORWARDED_BY_HEADER),
        HeaderValue::from_static("10.0.0.2:8080"),
    )
}

// =============================================================================
// SINGLE-KEY LOOKUPS
// =============================================================================

#[tokio::test]
async fn test_local_hit_returns_record_without_forwarding() {
    let fx = build(Setup::default());

    let response = fx.server.get("/accounts/42").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, account_json(42));
    assert!(fx.forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_local_miss_returns_not_found_envelope() {
    let fx = build(Setup::default());

    let response = fx.server.get("/accounts/99").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(
        envelope,
        ErrorEnvelope {
            status: "404 Not Found".to_string(),
            message: "Failed to retrieve value for account with id: 99".to_string(),
        }
    );
    assert_eq!(outcome_header(&response).as_deref(), Some("not_found"));
    assert!(fx.forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_leading_zeros_resolve_to_same_record() {
    let fx = build(Setup::default());

    let response = fx.server.get("/accounts/0042").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], 42);
}

#[tokio::test]
async fn test_remote_key_is_forwarded_once_and_passed_through() {
    let remote_body = json!({"id": 7, "owner": "Bob", "note": "only the peer has this field"});
    let fx = build(Setup {
        outcome: ForwardOutcome::Found(Record(remote_body.clone())),
        ..two_nodes()
    });
    let id = id_owned_by(&peer());

    let response = fx.server.get(&format!("/accounts/{}", id)).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, remote_body, "peer body passes through unchanged");
    assert_eq!(
        fx.forwarder.calls(),
        vec![format!("GET {}/accounts/{}", peer(), id)]
    );
}

#[tokio::test]
async fn test_locally_owned_key_in_cluster_is_not_forwarded() {
    let fx = build(two_nodes());
    let id = id_owned_by(&me());

    let response = fx.server.get(&format!("/accounts/{}", id)).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, account_json(id));
    assert!(fx.forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_remote_failures_collapse_to_not_found() {
    let cases = [
        (ForwardOutcome::NotFound, "remote_not_found"),
        (ForwardOutcome::Unreachable("connection refused".into()), "unreachable"),
        (ForwardOutcome::Timeout, "timeout"),
        (ForwardOutcome::DecodeError("not json".into()), "decode_error"),
    ];
    let id = id_owned_by(&peer());

    for (outcome, kind) in cases {
        let fx = build(Setup {
            outcome,
            ..two_nodes()
        });

        let response = fx.server.get(&format!("/accounts/{}", id)).await;

        response.assert_status(StatusCode::NOT_FOUND);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.status, "404 Not Found");
        assert_eq!(
            envelope.message,
            format!("Failed to retrieve value for account with id: {}", id)
        );
        assert_eq!(outcome_header(&response).as_deref(), Some(kind));
        assert_eq!(fx.forwarder.calls().len(), 1, "single attempt for {}", kind);
    }
}

#[tokio::test]
async fn test_distinct_mode_exposes_gateway_errors() {
    let distinct = ErrorPolicy {
        status: StatusMode::Http,
        remote: RemoteMode::Distinct,
    };
    let id = id_owned_by(&peer());

    let fx = build(Setup {
        outcome: ForwardOutcome::Timeout,
        policy: distinct,
        ..two_nodes()
    });
    let response = fx.server.get(&format!("/accounts/{}", id)).await;
    response.assert_status(StatusCode::GATEWAY_TIMEOUT);
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.status, "504 Gateway Timeout");
    assert!(envelope.message.contains(&peer().to_string()));

    let fx = build(Setup {
        outcome: ForwardOutcome::Unreachable("refused".into()),
        policy: distinct,
        ..two_nodes()
    });
    let response = fx.server.get(&format!("/accounts/{}", id)).await;
    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_always_ok_mode_keeps_envelope_status() {
    let fx = build(Setup {
        policy: ErrorPolicy {
            status: StatusMode::AlwaysOk,
            remote: RemoteMode::Collapse,
        },
        ..Setup::default()
    });

    let response = fx.server.get("/accounts/99").await;

    response.assert_status_ok();
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.status, "404 Not Found");
}

#[tokio::test]
async fn test_peer_requests_are_never_forwarded_again() {
    let fx = build(Setup {
        outcome: ForwardOutcome::Found(Record(json!({"id": 1}))),
        ..two_nodes()
    });
    let id = id_owned_by(&peer());
    let (name, value) = forwarded_by();

    let response = fx
        .server
        .get(&format!("/accounts/{}", id))
        .add_header(name, value)
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert!(fx.forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let fx = build(Setup::default());

    let response = fx.server.get("/accounts/abc").await;

    response.assert_status_bad_request();
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.status, "400 Bad Request");
    assert!(envelope.message.contains("abc"));
    assert_eq!(outcome_header(&response).as_deref(), Some("invalid_key"));
}

#[tokio::test]
async fn test_malformed_request_gets_envelope() {
    let fx = build(Setup::default());

    let bad_scope = fx.server.get("/accounts").add_query_param("scope", "everywhere").await;
    bad_scope.assert_status_bad_request();
    let envelope: ErrorEnvelope = bad_scope.json();
    assert_eq!(envelope.status, "400 Bad Request");
    assert!(envelope.message.starts_with("Bad request:"));
    assert_eq!(outcome_header(&bad_scope).as_deref(), Some("bad_request"));

    let bad_id = fx.server.get("/accounts/%FF").await;
    bad_id.assert_status_bad_request();
    let envelope: ErrorEnvelope = bad_id.json();
    assert_eq!(envelope.status, "400 Bad Request");
    assert_eq!(outcome_header(&bad_id).as_deref(), Some("bad_request"));
    assert!(fx.forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_resource_is_not_found() {
    let fx = build(Setup::default());

    let response = fx.server.get("/invoices/1").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.message, "Unknown resource: invoices");
    assert_eq!(outcome_header(&response).as_deref(), Some("unknown_resource"));
}

// =============================================================================
// REBALANCE + HEALTH
// =============================================================================

#[tokio::test]
async fn test_store_not_ready_during_rebalance() {
    let fx = build(Setup::default());
    fx.runtime.begin_rebalance().unwrap();

    let response = fx.server.get("/accounts/42").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.message, "account store accountStore is not ready");

    let health = fx.server.get("/health").await;
    health.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: HealthResponse = health.json();
    assert!(!body.live);
    assert_eq!(body.state, RuntimeState::Rebalancing);
    assert_eq!(body.status, "DOWN");

    fx.runtime
        .complete_rebalance(Assignment::round_robin(PARTITIONS, &[me()]).unwrap())
        .unwrap();
    fx.server.get("/accounts/42").await.assert_status_ok();
    fx.server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_reports_live_when_running() {
    let fx = build(Setup::default());

    let response = fx.server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert!(health.live);
    assert_eq!(health.status, "UP");
    assert_eq!(health.state, RuntimeState::Running);
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// LISTING
// =============================================================================

#[tokio::test]
async fn test_empty_list_returns_envelope() {
    let fx = build(Setup::default());

    let response = fx.server.get("/subscriptions").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.message, "No subscription values found");
    assert_eq!(outcome_header(&response).as_deref(), Some("empty"));
}

#[tokio::test]
async fn test_list_is_local_by_default() {
    let fx = build(two_nodes());
    let assignment = Assignment::round_robin(PARTITIONS, &[me(), peer()]).unwrap();
    let owned = (0..40u64)
        .filter(|id| {
            assignment
                .locate(&RecordKey::from(*id))
                .is_some_and(|(_, o)| *o == me())
        })
        .count();

    let response = fx.server.get("/accounts").await;

    response.assert_status_ok();
    let items: Vec<Value> = response.json();
    assert_eq!(items.len(), owned);
    assert!(fx.forwarder.calls().is_empty());
}

#[tokio::test]
async fn test_cluster_scope_merges_peer_listing() {
    let fx = build(Setup {
        outcome: ForwardOutcome::Found(Record(json!([{"id": 1000}, {"id": 1001}]))),
        ..two_nodes()
    });
    let local: Vec<Value> = fx.server.get("/accounts").await.json();

    let response = fx.server.get("/accounts?scope=cluster").await;

    response.assert_status_ok();
    let items: Vec<Value> = response.json();
    assert_eq!(items.len(), local.len() + 2);
    assert_eq!(fx.forwarder.calls(), vec![format!("LIST {}/accounts", peer())]);
}

#[tokio::test]
async fn test_cluster_scope_skips_failed_peers() {
    let fx = build(Setup {
        outcome: ForwardOutcome::Timeout,
        ..two_nodes()
    });
    let local: Vec<Value> = fx.server.get("/accounts").await.json();

    let response = fx.server.get("/accounts?scope=cluster").await;

    response.assert_status_ok();
    let items: Vec<Value> = response.json();
    assert_eq!(items.len(), local.len());
}

// =============================================================================
// METADATA ENDPOINTS
// =============================================================================

#[tokio::test]
async fn test_meta_lists_owners() {
    let fx = build(two_nodes());

    let response = fx.server.get("/_meta/accounts").await;

    response.assert_status_ok();
    let body: OwnersResponse = response.json();
    assert_eq!(body.store, "accountStore");
    assert_eq!(body.owners, vec![me(), peer()]);
}

#[tokio::test]
async fn test_meta_describes_key() {
    let fx = build(two_nodes());
    let id = id_owned_by(&peer());

    let response = fx.server.get(&format!("/_meta/accounts/{}", id)).await;

    response.assert_status_ok();
    let meta: KeyMetadata = response.json();
    assert_eq!(meta.owner, peer());
    assert!(!meta.local);
    assert_eq!(meta.partition, partition_for(&RecordKey::from(id), PARTITIONS));
    assert!(fx.forwarder.calls().is_empty());
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[tokio::test]
async fn test_api_key_guards_resources_but_not_health() {
    let fx = build(Setup {
        settings: ServerSettings {
            api_key: Some("cluster-secret".to_string()),
            rate_limit: 0,
            cors_origins: None,
        },
        ..Setup::default()
    });

    fx.server.get("/health").await.assert_status_ok();
    fx.server.get("/accounts/42").await.assert_status_unauthorized();

    let response = fx
        .server
        .get("/accounts/42")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"))
        .await;
    response.assert_status_unauthorized();

    let response = fx
        .server
        .get("/accounts/42")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer cluster-secret"),
        )
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_rate_limit_rejects_burst() {
    let fx = build(Setup {
        settings: ServerSettings {
            rate_limit: 2,
            ..ServerSettings::default()
        },
        ..Setup::default()
    });

    fx.server.get("/accounts/42").await.assert_status_ok();
    fx.server.get("/accounts/42").await.assert_status_ok();
    fx.server
        .get("/accounts/42")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}
