//! # shardgate HTTP API Module
//!
//! This module implements the HTTP read API using axum. Clients and peers
//! use the same endpoints; a peer marks its requests with the
//! `x-shardgate-forwarded-by` header.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness (200 once settled after a rebalance, 503 otherwise)
//! - `GET /{resource}` - Every record of a resource (`?scope=cluster` to fan out)
//! - `GET /{resource}/{id}` - One record, wherever it lives
//! - `GET /_meta/{resource}` - Nodes owning part of the resource's store
//! - `GET /_meta/{resource}/{id}` - Partition and owner of one key
//!
//! ## Security Configuration (`[server]` section / environment)
//!
//! - `cors_origins` / `SHARDGATE_CORS_ORIGINS`: Comma-separated origins, or "*" for all (default: localhost only)
//! - `rate_limit` / `SHARDGATE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `api_key` / `SHARDGATE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::api_key_auth_middleware;
pub use handlers::{
    get_handler, health_handler, key_metadata_handler, list_handler, owners_handler,
};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    ErrorEnvelope, ErrorPolicy, HealthResponse, ListQuery, OwnersResponse, RemoteMode, StatusMode,
};

use crate::router::QueryRouter;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::get,
};
use serde::{Deserialize, Serialize};
use shardgate_core::{LivenessTracker, ShardgateError};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Security and throttling settings of the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bearer token required on every endpoint except `/health`.
    pub api_key: Option<String>,
    /// Requests per second, 0 disables limiting.
    pub rate_limit: u32,
    /// Comma-separated origins, "*" for all, unset for localhost only.
    pub cors_origins: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<QueryRouter>,
    pub liveness: LivenessTracker,
    pub policy: ErrorPolicy,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    /// State with the default error policy and server settings.
    #[must_use]
    pub fn new(router: Arc<QueryRouter>, liveness: LivenessTracker) -> Self {
        Self {
            router,
            liveness,
            policy: ErrorPolicy::default(),
            settings: Arc::new(ServerSettings::default()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ServerSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer.
///
/// - "*": allows all origins
/// - unset: localhost only
/// - otherwise: the comma-separated list, falling back to localhost if none parse
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting (if enabled)
/// 4. Authentication (if an API key is configured)
pub fn create_router(state: AppState) -> Router {
    let settings = state.settings.clone();
    let cors = build_cors_layer(settings.cors_origins.as_deref());

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/_meta/{resource}", get(handlers::owners_handler))
        .route("/_meta/{resource}/{id}", get(handlers::key_metadata_handler))
        .route("/{resource}", get(handlers::list_handler))
        .route("/{resource}/{id}", get(handlers::get_handler));

    match settings.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                Arc::<str>::from(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED - all endpoints are publicly accessible. \
                 Set SHARDGATE_API_KEY or [server].api_key to enable it."
            );
        }
    }

    if settings.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", settings.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(settings.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn run_server<F>(addr: &str, state: AppState, shutdown: F) -> Result<(), ShardgateError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ShardgateError::Io(format!("Bind failed: {}", e)))?;
    serve(listener, state, shutdown).await
}

/// Serve the API on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ShardgateError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);

    if let Ok(local) = listener.local_addr() {
        tracing::info!("shardgate HTTP server listening on {}", local);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ShardgateError::Io(format!("Server error: {}", e)))
}
