//! # Local Shard Accessor
//!
//! Read-only view over the partitions of one store that the local node owns.
//!
//! A `LocalStore` is handed out by the runtime and captures the owned
//! partition set at that moment. Keys hashing to any other partition read as
//! absent even if stale bytes are still on disk from before a rebalance.
//! Nothing here touches the network.

use crate::partitioner::partition_for;
use crate::storage::ShardStorage;
use crate::{Record, RecordKey, ShardgateError};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// Handle on the locally owned partitions of a store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    name: String,
    partitions: u32,
    owned: Arc<BTreeSet<u32>>,
    storage: Arc<dyn ShardStorage>,
}

impl LocalStore {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        partitions: u32,
        owned: BTreeSet<u32>,
        storage: Arc<dyn ShardStorage>,
    ) -> Self {
        Self {
            name: name.into(),
            partitions,
            owned: Arc::new(owned),
            storage,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partitions this handle serves.
    #[must_use]
    pub fn owned_partitions(&self) -> &BTreeSet<u32> {
        &self.owned
    }

    /// Look up a key in the local shard.
    ///
    /// Returns `Ok(None)` both when the key is absent and when its partition
    /// is owned elsewhere.
    pub fn get(&self, key: &RecordKey) -> Result<Option<Record>, ShardgateError> {
        let partition = partition_for(key, self.partitions);
        if !self.owned.contains(&partition) {
            return Ok(None);
        }
        self.storage
            .get(&self.name, partition, key)?
            .map(|bytes| Record::from_slice(&bytes))
            .transpose()
    }

    /// Lazily iterate every record in the owned partitions.
    ///
    /// This is local-only: it never sees partitions held by other nodes.
    /// The scan consumes the handle's partition list and cannot be
    /// restarted; take a new handle for a second pass.
    #[must_use]
    pub fn scan_all(&self) -> ShardScan {
        ShardScan {
            store: self.name.clone(),
            storage: Arc::clone(&self.storage),
            pending: self.owned.iter().copied().collect(),
            buffered: VecDeque::new(),
            failed: false,
        }
    }
}

/// Lazy scan over owned partitions, loading one partition at a time.
///
/// Yields `Err` once if storage fails, then ends.
#[derive(Debug)]
pub struct ShardScan {
    store: String,
    storage: Arc<dyn ShardStorage>,
    pending: VecDeque<u32>,
    buffered: VecDeque<Vec<u8>>,
    failed: bool,
}

impl Iterator for ShardScan {
    type Item = Result<Record, ShardgateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(bytes) = self.buffered.pop_front() {
                return Some(Record::from_slice(&bytes));
            }
            let partition = self.pending.pop_front()?;
            match self.storage.scan_partition(&self.store, partition) {
                Ok(values) => self.buffered.extend(values),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
