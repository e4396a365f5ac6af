//! # Partition Assignment
//!
//! The table the runtime consults to answer "who owns partition p right
//! now". One assignment covers every store: stores are co-partitioned, so a
//! key's partition (and owner) is the same whichever store it lives in.

use crate::partitioner::partition_for;
use crate::{NodeAddress, RecordKey, ShardgateError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Partition -> owning node. Every partition has exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    partitions: u32,
    owners: BTreeMap<u32, NodeAddress>,
}

impl Assignment {
    /// Spread `partitions` over `members` round-robin.
    ///
    /// Members are sorted and deduplicated first, so every node reading the
    /// same member list computes the same table whatever order it was
    /// written in.
    pub fn round_robin(partitions: u32, members: &[NodeAddress]) -> Result<Self, ShardgateError> {
        if partitions == 0 {
            return Err(ShardgateError::Config(
                "partition count must be greater than zero".to_string(),
            ));
        }
        let members: Vec<NodeAddress> = members
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if members.is_empty() {
            return Err(ShardgateError::Config(
                "cluster must have at least one member".to_string(),
            ));
        }

        let owners = (0..partitions)
            .map(|p| (p, members[p as usize % members.len()].clone()))
            .collect();
        Ok(Self { partitions, owners })
    }

    /// Build an assignment from an explicit table.
    ///
    /// Used when the runtime hands over a rebalanced layout. The table must
    /// cover partitions `0..partitions` exactly.
    pub fn from_table(
        partitions: u32,
        owners: BTreeMap<u32, NodeAddress>,
    ) -> Result<Self, ShardgateError> {
        if partitions == 0 {
            return Err(ShardgateError::Config(
                "partition count must be greater than zero".to_string(),
            ));
        }
        let complete = owners.len() == partitions as usize
            && owners.keys().copied().eq(0..partitions);
        if !complete {
            return Err(ShardgateError::Config(format!(
                "assignment must cover partitions 0..{} exactly",
                partitions
            )));
        }
        Ok(Self { partitions, owners })
    }

    #[must_use]
    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    #[must_use]
    pub fn owner_of(&self, partition: u32) -> Option<&NodeAddress> {
        self.owners.get(&partition)
    }

    /// Partition and owner for a key.
    #[must_use]
    pub fn locate(&self, key: &RecordKey) -> Option<(u32, &NodeAddress)> {
        let partition = partition_for(key, self.partitions);
        self.owner_of(partition).map(|owner| (partition, owner))
    }

    /// Partitions owned by `node`.
    #[must_use]
    pub fn owned_by(&self, node: &NodeAddress) -> BTreeSet<u32> {
        self.owners
            .iter()
            .filter(|(_, owner)| *owner == node)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Distinct owning nodes in address order.
    #[must_use]
    pub fn members(&self) -> Vec<NodeAddress> {
        self.owners
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Iterate `(partition, owner)` pairs in partition order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &NodeAddress)> {
        self.owners.iter().map(|(p, owner)| (*p, owner))
    }
}
