//! # Partition Metadata Resolver
//!
//! Answers "which node owns this key right now" on top of the runtime's
//! metadata queries. Whenever the runtime cannot answer, the resolver fails
//! with `AssignmentUnavailable` instead of guessing an owner.

use crate::partitioner::partition_for;
use crate::runtime::StreamsRuntime;
use crate::{NodeAddress, RecordKey, ShardgateError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a key lives, as reported by the admin endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub store: String,
    pub key: RecordKey,
    pub partition: u32,
    pub owner: NodeAddress,
    pub local: bool,
}

/// Resolves key ownership against the live runtime assignment.
#[derive(Clone)]
pub struct MetadataResolver {
    runtime: Arc<dyn StreamsRuntime>,
    self_address: NodeAddress,
    partitions: u32,
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("self_address", &self.self_address)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

/// Unknown stores read as "not available" at this layer.
fn unavailable(store: &str, e: ShardgateError) -> ShardgateError {
    match e {
        ShardgateError::UnknownStore(_) => ShardgateError::AssignmentUnavailable(store.to_string()),
        other => other,
    }
}

impl MetadataResolver {
    #[must_use]
    pub fn new(runtime: Arc<dyn StreamsRuntime>, self_address: NodeAddress, partitions: u32) -> Self {
        Self {
            runtime,
            self_address,
            partitions,
        }
    }

    #[must_use]
    pub fn self_address(&self) -> &NodeAddress {
        &self.self_address
    }

    /// Current owner of `key` in `store`.
    pub fn resolve_owner(&self, store: &str, key: &RecordKey) -> Result<NodeAddress, ShardgateError> {
        self.runtime
            .query_metadata_for_key(store, key)
            .map_err(|e| unavailable(store, e))
    }

    /// Every node owning part of `store`.
    pub fn owners(&self, store: &str) -> Result<Vec<NodeAddress>, ShardgateError> {
        self.runtime
            .all_metadata_for_store(store)
            .map_err(|e| unavailable(store, e))
    }

    /// Whether `owner` is this node, by host and port.
    #[must_use]
    pub fn is_local(&self, owner: &NodeAddress) -> bool {
        *owner == self.self_address
    }

    /// Full placement of a key.
    pub fn describe(&self, store: &str, key: &RecordKey) -> Result<KeyMetadata, ShardgateError> {
        let owner = self.resolve_owner(store, key)?;
        Ok(KeyMetadata {
            store: store.to_string(),
            key: key.clone(),
            partition: partition_for(key, self.partitions),
            local: self.is_local(&owner),
            owner,
        })
    }
}
