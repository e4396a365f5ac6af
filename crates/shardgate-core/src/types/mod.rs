//! # Core Type Definitions
//!
//! This module contains the value types shared by every routing component:
//! - Node addressing (`NodeAddress`)
//! - Record identity (`RecordKey`, `KeyKind`)
//! - Stream runtime lifecycle (`RuntimeState`)
//! - Error types (`ShardgateError`)
//!
//! ## Equality Guarantees
//!
//! `NodeAddress` and `RecordKey` are plain values compared field by field.
//! Two addresses built independently from the same host and port are equal;
//! nothing in the router compares by reference.

use crate::primitives::MAX_KEY_LENGTH;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// NODE ADDRESS
// =============================================================================

/// The query endpoint a node advertises to its peers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL for HTTP requests to this node, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = ShardgateError;

    /// Parse `host:port`. The port is taken after the last colon.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| ShardgateError::Config(format!("missing port in address '{}'", s)))?;
        if host.is_empty() {
            return Err(ShardgateError::Config(format!(
                "missing host in address '{}'",
                s
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| ShardgateError::Config(format!("invalid port in '{}': {}", s, e)))?;
        Ok(Self::new(host, port))
    }
}

// =============================================================================
// RECORD KEYS
// =============================================================================

/// The key a record is stored and partitioned under.
///
/// Keys travel in URL paths, so they are kept in their textual form. Integer
/// keys are normalized by [`KeyKind::parse`] before they reach the
/// partitioner; `"007"` and `"7"` always land on the same partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl RecordKey {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes fed to the partitioner.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<u64> for RecordKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a resource's keys are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Unsigned integer ids (`accounts`, `subscriptions`).
    #[default]
    Integer,
    /// Arbitrary non-empty strings.
    String,
}

impl KeyKind {
    /// Validate and normalize a raw key taken from a path or a record.
    pub fn parse(self, raw: &str) -> Result<RecordKey, ShardgateError> {
        if raw.is_empty() {
            return Err(ShardgateError::InvalidKey("key is empty".to_string()));
        }
        if raw.len() > MAX_KEY_LENGTH {
            return Err(ShardgateError::InvalidKey(format!(
                "key length {} exceeds maximum {} bytes",
                raw.len(),
                MAX_KEY_LENGTH
            )));
        }
        match self {
            Self::Integer => raw
                .parse::<u64>()
                .map(RecordKey::from)
                .map_err(|_| ShardgateError::InvalidKey(format!("'{}' is not an integer id", raw))),
            Self::String => Ok(RecordKey::new(raw)),
        }
    }
}

// =============================================================================
// RUNTIME STATE
// =============================================================================

/// Lifecycle state of the stream runtime that owns the partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeState {
    Created,
    Rebalancing,
    Running,
    PendingShutdown,
    NotRunning,
    Error,
}

impl RuntimeState {
    /// Whether the runtime may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use RuntimeState::{Created, Error, NotRunning, PendingShutdown, Rebalancing, Running};
        matches!(
            (self, next),
            (Created, Rebalancing | PendingShutdown | Error)
                | (Rebalancing, Running | Rebalancing | PendingShutdown | Error)
                | (Running, Rebalancing | PendingShutdown | Error)
                | (PendingShutdown, NotRunning)
                | (Error, PendingShutdown)
        )
    }

    /// Ownership metadata is only trustworthy while running.
    #[must_use]
    pub fn is_queryable(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Rebalancing => "REBALANCING",
            Self::Running => "RUNNING",
            Self::PendingShutdown => "PENDING_SHUTDOWN",
            Self::NotRunning => "NOT_RUNNING",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the routing primitives.
///
/// - No silent failures
/// - The core never panics; every error is recoverable by the caller
#[derive(Debug, Error)]
pub enum ShardgateError {
    /// The store name is not part of the running topology.
    #[error("Unknown store: {0}")]
    UnknownStore(String),

    /// Partition ownership cannot be determined right now.
    #[error("Assignment unavailable for store {0}")]
    AssignmentUnavailable(String),

    /// A record key failed validation.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The runtime refused a lifecycle transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: RuntimeState,
        to: RuntimeState,
    },

    /// The shard storage engine failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================
