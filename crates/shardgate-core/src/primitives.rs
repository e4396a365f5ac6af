//! # Routing Primitives
//!
//! Compiled-in constants shared by the core and the application layer.

/// Upper bound on a single forwarded request, connect to last body byte.
///
/// A timed-out forward is abandoned and classified as a timeout; the peer is
/// not told.
pub const FORWARD_TIMEOUT_SECS: u64 = 60;

/// Partition count used when the cluster configuration does not set one.
pub const DEFAULT_PARTITIONS: u32 = 12;

/// Maximum length of a record key in bytes.
///
/// Keys arrive in URL paths; anything longer is rejected before hashing.
pub const MAX_KEY_LENGTH: usize = 256;

/// Header a node sets when it forwards a query to the owning peer.
///
/// The peer serves such requests from its own shard and never forwards
/// them again, so a stale assignment cannot bounce a request around.
pub const FORWARDED_BY_HEADER: &str = "x-shardgate-forwarded-by";

/// Header carrying the internal classification of a failed request.
pub const OUTCOME_HEADER: &str = "x-shardgate-outcome";
