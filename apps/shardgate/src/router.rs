//! # Query Router
//!
//! Decides, per request, whether the local shard or a peer answers.
//!
//! ```text
//! request -> resolve owner -> owner == self ? local shard : forward to owner
//!                                   \                          /
//!                                    +------> format <--------+
//! ```
//!
//! The router keeps no state between requests. Everything it knows comes
//! from the runtime (ownership, local shard) and the forwarder (peers).
//! Failures keep their full classification in [`RouteError`]; the formatting
//! layer decides how much of it a client sees.

use crate::forward::{Forwarder, RemoteFailure};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use shardgate_core::{
    KeyKind, KeyMetadata, LocalStore, MetadataResolver, NodeAddress, Record, RecordKey,
    RuntimeState, ShardgateError, StreamsRuntime,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// RESOURCES
// =============================================================================

/// A URL resource backed by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Path segment, e.g. `accounts`.
    pub name: String,
    /// Runtime store name, e.g. `accountStore`.
    pub store: String,
    /// Noun used in messages, e.g. `account`.
    pub singular: String,
    /// Key validation.
    #[serde(default)]
    pub key: KeyKind,
    /// Record field holding the key, used by the loader.
    #[serde(default = "default_key_field")]
    pub key_field: String,
}

fn default_key_field() -> String {
    "id".to_string()
}

impl ResourceSpec {
    #[must_use]
    pub fn new(name: &str, store: &str, singular: &str, key: KeyKind) -> Self {
        Self {
            name: name.to_string(),
            store: store.to_string(),
            singular: singular.to_string(),
            key,
            key_field: default_key_field(),
        }
    }
}

/// The two resources of the reference deployment.
#[must_use]
pub fn default_resources() -> Vec<ResourceSpec> {
    vec![
        ResourceSpec::new("accounts", "accountStore", "account", KeyKind::Integer),
        ResourceSpec::new(
            "subscriptions",
            "subscriptionStore",
            "subscription",
            KeyKind::Integer,
        ),
    ]
}

/// Resource name -> spec.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    by_name: BTreeMap<String, ResourceSpec>,
}

impl ResourceRegistry {
    /// Build a registry, rejecting empty or duplicate names.
    pub fn new(specs: Vec<ResourceSpec>) -> Result<Self, ShardgateError> {
        let mut by_name = BTreeMap::new();
        for spec in specs {
            if spec.name.is_empty() || spec.store.is_empty() {
                return Err(ShardgateError::Config(
                    "resource name and store must be non-empty".to_string(),
                ));
            }
            if spec.name.starts_with('_') {
                return Err(ShardgateError::Config(format!(
                    "resource name '{}' is reserved",
                    spec.name
                )));
            }
            let name = spec.name.clone();
            if by_name.insert(name.clone(), spec).is_some() {
                return Err(ShardgateError::Config(format!(
                    "resource '{}' declared twice",
                    name
                )));
            }
        }
        Ok(Self { by_name })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.by_name.get(name)
    }

    /// Distinct store names, for runtime and storage setup.
    #[must_use]
    pub fn stores(&self) -> Vec<String> {
        let mut stores: Vec<String> = self.by_name.values().map(|s| s.store.clone()).collect();
        stores.sort();
        stores.dedup();
        stores
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.by_name.values()
    }
}

// =============================================================================
// REQUEST SHAPE
// =============================================================================

/// Who sent the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An external client. Routed normally.
    Client,
    /// A peer forwarding to us as the owner. Always served locally.
    Peer,
}

/// How far a list request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// This node's shard only.
    #[default]
    Local,
    /// Every owning node, merged.
    Cluster,
}

/// Which side answered a single-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Local,
    Remote(NodeAddress),
}

/// A successful single-key lookup.
#[derive(Debug, Clone)]
pub struct Routed {
    pub record: Record,
    pub served: Served,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Every way a routed request can fail.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Unknown resource: {resource}")]
    UnknownResource { resource: String },

    #[error("Invalid id '{id}' for {singular}: {reason}")]
    InvalidKey {
        singular: String,
        id: String,
        reason: String,
    },

    #[error("Failed to retrieve value for {singular} with id: {id}")]
    NotFound { singular: String, id: String },

    #[error("{singular} store {store} is not ready")]
    StoreNotReady { singular: String, store: String },

    #[error("{singular} store {store} is not part of the running topology")]
    UnknownStore { singular: String, store: String },

    #[error("Failed to retrieve value for {singular} with id: {id}")]
    Remote {
        singular: String,
        id: String,
        owner: NodeAddress,
        failure: RemoteFailure,
    },

    #[error("No {singular} values found")]
    Empty { singular: String },

    #[error("Storage failure reading {singular}: {message}")]
    Storage { singular: String, message: String },

    /// The request itself could not be parsed (path or query string).
    #[error("Bad request: {reason}")]
    BadRequest { reason: String },
}

impl RouteError {
    /// Stable label for logs and the outcome header.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownResource { .. } => "unknown_resource",
            Self::InvalidKey { .. } => "invalid_key",
            Self::NotFound { .. } => "not_found",
            Self::StoreNotReady { .. } => "store_not_ready",
            Self::UnknownStore { .. } => "unknown_store",
            Self::Remote { failure, .. } => failure.kind(),
            Self::Empty { .. } => "empty",
            Self::Storage { .. } => "storage",
            Self::BadRequest { .. } => "bad_request",
        }
    }
}

fn store_error(spec: &ResourceSpec, e: ShardgateError) -> RouteError {
    match e {
        ShardgateError::UnknownStore(store) => RouteError::UnknownStore {
            singular: spec.singular.clone(),
            store,
        },
        ShardgateError::AssignmentUnavailable(store) => RouteError::StoreNotReady {
            singular: spec.singular.clone(),
            store,
        },
        other => RouteError::Storage {
            singular: spec.singular.clone(),
            message: other.to_string(),
        },
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Routes reads to the local shard or the owning peer.
#[derive(Clone)]
pub struct QueryRouter {
    runtime: Arc<dyn StreamsRuntime>,
    resolver: MetadataResolver,
    forwarder: Arc<dyn Forwarder>,
    resources: ResourceRegistry,
}

impl std::fmt::Debug for QueryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRouter")
            .field("resolver", &self.resolver)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

impl QueryRouter {
    #[must_use]
    pub fn new(
        runtime: Arc<dyn StreamsRuntime>,
        resolver: MetadataResolver,
        forwarder: Arc<dyn Forwarder>,
        resources: ResourceRegistry,
    ) -> Self {
        Self {
            runtime,
            resolver,
            forwarder,
            resources,
        }
    }

    #[must_use]
    pub fn self_address(&self) -> &NodeAddress {
        self.resolver.self_address()
    }

    #[must_use]
    pub fn runtime_state(&self) -> RuntimeState {
        self.runtime.state()
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    fn spec(&self, resource: &str) -> Result<&ResourceSpec, RouteError> {
        self.resources
            .get(resource)
            .ok_or_else(|| RouteError::UnknownResource {
                resource: resource.to_string(),
            })
    }

    fn parse_key(spec: &ResourceSpec, id: &str) -> Result<RecordKey, RouteError> {
        spec.key.parse(id).map_err(|e| RouteError::InvalidKey {
            singular: spec.singular.clone(),
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn local_store(&self, spec: &ResourceSpec) -> Result<LocalStore, RouteError> {
        self.runtime
            .local_store(&spec.store)
            .map_err(|e| store_error(spec, e))
    }

    /// Look up one record, wherever it lives.
    pub async fn handle_get(
        &self,
        resource: &str,
        id: &str,
        origin: Origin,
    ) -> Result<Routed, RouteError> {
        let spec = self.spec(resource)?;
        let key = Self::parse_key(spec, id)?;

        let owner = match self.resolver.resolve_owner(&spec.store, &key) {
            Ok(owner) => owner,
            Err(e) if origin == Origin::Peer => {
                tracing::warn!(store = %spec.store, key = %key, "Serving forwarded query without metadata: {}", e);
                return self.get_local(spec, &key);
            }
            Err(e) => {
                tracing::warn!(store = %spec.store, key = %key, "Owner resolution failed: {}", e);
                return Err(store_error(spec, e));
            }
        };

        if self.resolver.is_local(&owner) {
            return self.get_local(spec, &key);
        }

        if origin == Origin::Peer {
            // The sender's assignment disagrees with ours; answer from what we hold.
            tracing::warn!(
                store = %spec.store,
                key = %key,
                owner = %owner,
                "Forwarded query for a key this node does not own"
            );
            return self.get_local(spec, &key);
        }

        self.get_remote(spec, &key, owner).await
    }

    fn get_local(&self, spec: &ResourceSpec, key: &RecordKey) -> Result<Routed, RouteError> {
        let store = self.local_store(spec)?;
        match store.get(key) {
            Ok(Some(record)) => {
                tracing::debug!(store = %spec.store, key = %key, "Served from local shard");
                Ok(Routed {
                    record,
                    served: Served::Local,
                })
            }
            Ok(None) => Err(RouteError::NotFound {
                singular: spec.singular.clone(),
                id: key.to_string(),
            }),
            Err(e) => Err(store_error(spec, e)),
        }
    }

    async fn get_remote(
        &self,
        spec: &ResourceSpec,
        key: &RecordKey,
        owner: NodeAddress,
    ) -> Result<Routed, RouteError> {
        let outcome = self.forwarder.forward_get(&owner, &spec.name, key).await;
        match outcome.into_result() {
            Ok(record) => {
                tracing::debug!(store = %spec.store, key = %key, owner = %owner, "Served by peer");
                Ok(Routed {
                    record,
                    served: Served::Remote(owner),
                })
            }
            Err(failure) => {
                tracing::warn!(
                    store = %spec.store,
                    key = %key,
                    owner = %owner,
                    outcome = failure.kind(),
                    "Forwarded lookup failed: {}",
                    failure
                );
                Err(RouteError::Remote {
                    singular: spec.singular.clone(),
                    id: key.to_string(),
                    owner,
                    failure,
                })
            }
        }
    }

    /// List records of a resource.
    ///
    /// `Scope::Local` returns this node's shard only. `Scope::Cluster` also
    /// asks every other owner for its shard; peers that fail are logged and
    /// left out. Forwarded requests never fan out again.
    pub async fn handle_list(
        &self,
        resource: &str,
        scope: Scope,
        origin: Origin,
    ) -> Result<Vec<Record>, RouteError> {
        let spec = self.spec(resource)?;
        let mut records = self.scan_local(spec)?;

        if scope == Scope::Cluster && origin == Origin::Client {
            let owners = self
                .resolver
                .owners(&spec.store)
                .map_err(|e| store_error(spec, e))?;
            let peers: Vec<NodeAddress> = owners
                .into_iter()
                .filter(|owner| !self.resolver.is_local(owner))
                .collect();

            let outcomes = join_all(
                peers
                    .iter()
                    .map(|peer| self.forwarder.forward_list(peer, &spec.name)),
            )
            .await;

            for (peer, outcome) in peers.iter().zip(outcomes) {
                match outcome.into_result() {
                    Ok(Record(serde_json::Value::Array(items))) => {
                        records.extend(items.into_iter().map(Record));
                    }
                    Ok(_) => {
                        tracing::warn!(peer = %peer, "Peer list response was not an array");
                    }
                    Err(RemoteFailure::NotFound) => {}
                    Err(failure) => {
                        tracing::warn!(
                            peer = %peer,
                            store = %spec.store,
                            outcome = failure.kind(),
                            "Skipping peer in cluster listing: {}",
                            failure
                        );
                    }
                }
            }
        }

        if records.is_empty() {
            return Err(RouteError::Empty {
                singular: spec.singular.clone(),
            });
        }
        Ok(records)
    }

    fn scan_local(&self, spec: &ResourceSpec) -> Result<Vec<Record>, RouteError> {
        self.local_store(spec)?
            .scan_all()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_error(spec, e))
    }

    /// Placement of a key, for the admin endpoint.
    pub fn describe(&self, resource: &str, id: &str) -> Result<KeyMetadata, RouteError> {
        let spec = self.spec(resource)?;
        let key = Self::parse_key(spec, id)?;
        self.resolver
            .describe(&spec.store, &key)
            .map_err(|e| store_error(spec, e))
    }

    /// Nodes owning part of a resource's store.
    pub fn owners(&self, resource: &str) -> Result<Vec<NodeAddress>, RouteError> {
        let spec = self.spec(resource)?;
        self.resolver
            .owners(&spec.store)
            .map_err(|e| store_error(spec, e))
    }
}
