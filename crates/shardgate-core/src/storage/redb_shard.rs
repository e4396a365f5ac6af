//! # redb-backed Shard Storage
//!
//! A disk-backed shard using the redb embedded database, providing:
//! - ACID writes for the loader
//! - MVCC snapshots, so request tasks read without blocking each other
//! - Crash safety (copy-on-write B-trees)
//!
//! ## Layout
//!
//! One table per store, keyed by `(partition, key)`. A partition is a
//! contiguous key range, so scanning the partitions a node owns is one range
//! read per partition.

use super::{ShardEntry, ShardStorage};
use crate::{RecordKey, ShardgateError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use std::path::Path;

type ShardTable<'a> = TableDefinition<'a, (u32, &'static str), &'static [u8]>;

fn table(store: &str) -> ShardTable<'_> {
    TableDefinition::new(store)
}

fn storage_err(e: impl std::fmt::Display) -> ShardgateError {
    ShardgateError::Storage(e.to_string())
}

/// Shard storage persisted in a single redb file.
pub struct RedbShard {
    db: Database,
}

impl std::fmt::Debug for RedbShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbShard").finish_non_exhaustive()
    }
}

impl RedbShard {
    /// Open or create the shard file and make sure every store has a table.
    pub fn open(path: impl AsRef<Path>, stores: &[&str]) -> Result<Self, ShardgateError> {
        let db = Database::create(path.as_ref()).map_err(|e| ShardgateError::Io(e.to_string()))?;

        let write_txn = db.begin_write().map_err(storage_err)?;
        for store in stores {
            let _ = write_txn.open_table(table(store)).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        tracing::debug!(path = %path.as_ref().display(), stores = stores.len(), "opened redb shard");
        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, ShardgateError> {
        self.db.compact().map_err(storage_err)
    }
}

impl ShardStorage for RedbShard {
    fn get(
        &self,
        store: &str,
        partition: u32,
        key: &RecordKey,
    ) -> Result<Option<Vec<u8>>, ShardgateError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let values = match read_txn.open_table(table(store)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };

        Ok(values
            .get((partition, key.as_str()))
            .map_err(storage_err)?
            .map(|v| v.value().to_vec()))
    }

    fn scan_partition(&self, store: &str, partition: u32) -> Result<Vec<Vec<u8>>, ShardgateError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let values = match read_txn.open_table(table(store)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(e)),
        };

        let mut out = Vec::new();
        for entry in values
            .range((partition, "")..(partition.saturating_add(1), ""))
            .map_err(storage_err)?
        {
            let (_, value) = entry.map_err(storage_err)?;
            out.push(value.value().to_vec());
        }
        Ok(out)
    }

    fn put(
        &self,
        store: &str,
        partition: u32,
        key: &RecordKey,
        value: &[u8],
    ) -> Result<(), ShardgateError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut values = write_txn.open_table(table(store)).map_err(storage_err)?;
            values
                .insert((partition, key.as_str()), value)
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn put_batch(&self, store: &str, entries: &[ShardEntry]) -> Result<(), ShardgateError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut values = write_txn.open_table(table(store)).map_err(storage_err)?;
            for (partition, key, value) in entries {
                values
                    .insert((*partition, key.as_str()), value.as_slice())
                    .map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn len(&self, store: &str) -> Result<usize, ShardgateError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let values = match read_txn.open_table(table(store)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(e) => return Err(storage_err(e)),
        };
        Ok(values.len().map_err(storage_err)? as usize)
    }
}
