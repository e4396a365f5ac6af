//! # Shard Storage
//!
//! Raw byte storage behind the local shard accessor. Values are keyed by
//! `(store, partition, key)` so a node can read exactly the partitions it
//! owns without touching the rest.
//!
//! Two backends:
//! - `MemoryShard`: volatile, for tests and throwaway nodes
//! - `RedbShard`: disk-backed, one redb table per store

mod memory;
mod redb_shard;

pub use memory::MemoryShard;
pub use redb_shard::RedbShard;

use crate::{RecordKey, ShardgateError};

/// One value to write: `(partition, key, bytes)`.
pub type ShardEntry = (u32, RecordKey, Vec<u8>);

/// Storage engine holding the records of the local shard.
///
/// Implementations must be safe for concurrent readers; the router calls
/// them from many request tasks at once without further locking.
pub trait ShardStorage: Send + Sync + std::fmt::Debug {
    /// Raw value for `key` in `partition` of `store`.
    fn get(
        &self,
        store: &str,
        partition: u32,
        key: &RecordKey,
    ) -> Result<Option<Vec<u8>>, ShardgateError>;

    /// Every raw value in `partition` of `store`, in key order.
    fn scan_partition(&self, store: &str, partition: u32) -> Result<Vec<Vec<u8>>, ShardgateError>;

    /// Insert or replace a value. Only the loader writes.
    fn put(
        &self,
        store: &str,
        partition: u32,
        key: &RecordKey,
        value: &[u8],
    ) -> Result<(), ShardgateError>;

    /// Insert or replace many values of `store` at once. Either every entry
    /// is written or none is.
    fn put_batch(&self, store: &str, entries: &[ShardEntry]) -> Result<(), ShardgateError>;

    /// Number of values held for `store` across all partitions.
    fn len(&self, store: &str) -> Result<usize, ShardgateError>;
}
