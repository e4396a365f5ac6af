//! # shardgate
//!
//! Partition-aware query router. Every node of the cluster serves the same
//! read API; a request for a key this node does not own is forwarded to the
//! node that does.
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!  GET /accounts/7│  api (axum)                              │
//! ───────────────►│    │                                     │
//!                 │    ▼                                     │
//!                 │  router ──► shardgate-core resolver      │
//!                 │    │  \                                  │
//!                 │    │   └──► forward (reqwest) ──► owner  │
//!                 │    ▼                                     │
//!                 │  local shard (redb / memory)             │
//!                 └──────────────────────────────────────────┘
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod forward;
pub mod node;
pub mod router;

pub use config::NodeConfig;
pub use forward::{ForwardOutcome, Forwarder, HttpForwarder, RemoteFailure};
pub use node::NodeHandle;
pub use router::{
    Origin, QueryRouter, ResourceRegistry, ResourceSpec, RouteError, Routed, Scope, Served,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "shardgate=info,shardgate_core=info,tower_http=debug";

/// Install the global tracing subscriber.
///
/// `SHARDGATE_LOG_FORMAT=json` switches to machine-parseable output.
pub fn init_tracing() {
    let log_format = std::env::var("SHARDGATE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
