//! # Records
//!
//! Stored values are opaque JSON documents. The router only cares about two
//! things: the key a record is filed under and that it survives a JSON round
//! trip unchanged. Typed domain values convert in and out through [`Keyed`].

use crate::{KeyKind, RecordKey, ShardgateError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// =============================================================================
// RECORD
// =============================================================================

/// A stored value, serialized verbatim as the success body of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub serde_json::Value);

impl Record {
    /// Build a record from a typed domain value.
    pub fn from_keyed<T: Keyed + Serialize>(value: &T) -> Result<Self, ShardgateError> {
        serde_json::to_value(value)
            .map(Self)
            .map_err(|e| ShardgateError::Serialization(e.to_string()))
    }

    /// Decode into a typed domain value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ShardgateError> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| ShardgateError::Serialization(e.to_string()))
    }

    /// Decode a record from the bytes held by shard storage.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ShardgateError> {
        serde_json::from_slice(bytes)
            .map(Self)
            .map_err(|e| ShardgateError::Serialization(e.to_string()))
    }

    /// Encode for shard storage.
    pub fn to_vec(&self) -> Result<Vec<u8>, ShardgateError> {
        serde_json::to_vec(&self.0).map_err(|e| ShardgateError::Serialization(e.to_string()))
    }

    /// Extract the key of an untyped record from one of its fields.
    ///
    /// Numbers and strings are accepted and normalized through `kind`.
    pub fn key_field(&self, field: &str, kind: KeyKind) -> Result<RecordKey, ShardgateError> {
        let raw = match self.0.get(field) {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ShardgateError::InvalidKey(format!(
                    "field '{}' is neither a number nor a string",
                    field
                )));
            }
            None => {
                return Err(ShardgateError::InvalidKey(format!(
                    "record has no '{}' field",
                    field
                )));
            }
        };
        kind.parse(&raw)
    }
}

/// Domain values that know their own key.
pub trait Keyed {
    fn record_key(&self) -> RecordKey;
}

// =============================================================================
// REFERENCE DOMAIN TYPES
// =============================================================================

/// A customer account, stored in `accountStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub owner: String,
    pub email: String,
    pub tier: String,
}

impl Keyed for Account {
    fn record_key(&self) -> RecordKey {
        RecordKey::from(self.id)
    }
}

/// A plan subscription held by an account, stored in `subscriptionStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub account_id: u64,
    pub plan: String,
    pub active: bool,
}

impl Keyed for Subscription {
    fn record_key(&self) -> RecordKey {
        RecordKey::from(self.id)
    }
}
