//! # Key Partitioner
//!
//! Maps a record key to the partition that holds it. Every node must reach
//! the same answer for the same key, so the hash is BLAKE3 over the key
//! bytes rather than the std hasher, whose output is not stable across
//! releases or processes.

use crate::RecordKey;

/// Partition of `key` among `partitions` partitions.
///
/// `partitions` must be non-zero; assignments are validated on construction
/// so the runtime never calls this with zero. A zero count maps to partition
/// 0 instead of dividing by zero.
#[must_use]
pub fn partition_for(key: &RecordKey, partitions: u32) -> u32 {
    if partitions == 0 {
        return 0;
    }
    let digest = blake3::hash(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % u64::from(partitions)) as u32
}
