//! # shardgate-core
//!
//! The routing primitives behind the shardgate interactive query router.
//!
//! A keyed dataset is split into partitions spread over a cluster; each node
//! owns a disjoint set of them, and ownership moves when the cluster
//! rebalances. This crate answers the questions the router asks before every
//! read:
//!
//! - Which partition does this key hash to? (`partitioner`)
//! - Which node owns that partition right now? (`assignment`, `metadata`)
//! - What does the local shard hold for it? (`shard`, `storage`)
//! - Is this node settled after the last rebalance? (`liveness`)
//!
//! ## Architectural Constraints
//!
//! - No async, no network: forwarding lives in the application crate
//! - Never guess an owner: when the runtime cannot answer, say so
//! - Never panic: every failure is a `ShardgateError`

// =============================================================================
// MODULES
// =============================================================================

pub mod assignment;
pub mod liveness;
pub mod metadata;
pub mod partitioner;
pub mod primitives;
pub mod records;
pub mod runtime;
pub mod shard;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use types::{KeyKind, NodeAddress, RecordKey, RuntimeState, ShardgateError};

pub use assignment::Assignment;
pub use liveness::LivenessTracker;
pub use metadata::{KeyMetadata, MetadataResolver};
pub use partitioner::partition_for;
pub use records::{Account, Keyed, Record, Subscription};
pub use runtime::{EmbeddedRuntime, StateListener, StreamsRuntime};
pub use shard::{LocalStore, ShardScan};
pub use storage::{MemoryShard, RedbShard, ShardEntry, ShardStorage};
