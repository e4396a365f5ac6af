//! In-memory shard storage.

use super::{ShardEntry, ShardStorage};
use crate::{RecordKey, ShardgateError};
use std::collections::BTreeMap;
use std::sync::RwLock;

type PartitionedValues = BTreeMap<(u32, String), Vec<u8>>;

/// Volatile storage: store name -> (partition, key) -> value.
#[derive(Debug, Default)]
pub struct MemoryShard {
    stores: RwLock<BTreeMap<String, PartitionedValues>>,
}

impl MemoryShard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ShardgateError {
    ShardgateError::Storage("memory shard lock poisoned".to_string())
}

impl ShardStorage for MemoryShard {
    fn get(
        &self,
        store: &str,
        partition: u32,
        key: &RecordKey,
    ) -> Result<Option<Vec<u8>>, ShardgateError> {
        let stores = self.stores.read().map_err(|_| poisoned())?;
        Ok(stores
            .get(store)
            .and_then(|values| values.get(&(partition, key.0.clone())))
            .cloned())
    }

    fn scan_partition(&self, store: &str, partition: u32) -> Result<Vec<Vec<u8>>, ShardgateError> {
        let stores = self.stores.read().map_err(|_| poisoned())?;
        let Some(values) = stores.get(store) else {
            return Ok(Vec::new());
        };
        Ok(values
            .range((partition, String::new())..)
            .take_while(|((p, _), _)| *p == partition)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn put(
        &self,
        store: &str,
        partition: u32,
        key: &RecordKey,
        value: &[u8],
    ) -> Result<(), ShardgateError> {
        let mut stores = self.stores.write().map_err(|_| poisoned())?;
        stores
            .entry(store.to_string())
            .or_default()
            .insert((partition, key.0.clone()), value.to_vec());
        Ok(())
    }

    fn put_batch(&self, store: &str, entries: &[ShardEntry]) -> Result<(), ShardgateError> {
        let mut stores = self.stores.write().map_err(|_| poisoned())?;
        let values = stores.entry(store.to_string()).or_default();
        for (partition, key, value) in entries {
            values.insert((*partition, key.0.clone()), value.clone());
        }
        Ok(())
    }

    fn len(&self, store: &str) -> Result<usize, ShardgateError> {
        let stores = self.stores.read().map_err(|_| poisoned())?;
        Ok(stores.get(store).map_or(0, BTreeMap::len))
    }
}
