//! Audit events, WORM records, and chain state.
//!
//! `AuditEvent` is what callers hand to the store. `WormRecord` is what the
//! store writes: the event wrapped with an id, a service-assigned timestamp,
//! and its position in the SHA-256 hash chain. `ChainState` is the persisted
//! pointer to the head of that chain.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A structured audit event supplied by the application layer.
///
/// `event_type` is a free-form category such as `"login.success"`. Every
/// other field is carried verbatim into the record's `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Category string. The store does not enforce any enumeration.
    pub event_type: String,

    /// Arbitrary event fields, flattened next to `eventType` on the wire.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AuditEvent {
    /// Create an event with no fields.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: Map::new(),
        }
    }

    /// Attach one field, replacing any previous value under `key`.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// The unit of immutable storage.
///
/// Once written, none of these fields change on disk. Modifying any of
/// `id`, `timestamp`, `event_type`, `data` or `previous_hash` invalidates
/// `hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WormRecord {
    /// `<unix-millis>-<random suffix>`, generated at write time.
    pub id: String,

    /// Creation time assigned by the store, millisecond precision.
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,

    /// Caller-supplied category.
    pub event_type: String,

    /// Event fields plus optional `metadata`. Opaque to the store.
    pub data: Value,

    /// Lowercase hex SHA-256 over `previous_hash` and the canonical record.
    pub hash: String,

    /// `hash` of the record at `chain_index - 1`; absent for the first record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,

    /// Position in the global write sequence, starting at 0.
    pub chain_index: u64,
}

/// The persisted head of the hash chain.
///
/// `chain_index` is the index the *next* record will receive, so a fresh
/// store is `(0, None)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub chain_index: u64,
    pub last_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ChainState {
    /// The state of a store that has never accepted a write.
    pub fn genesis() -> Self {
        Self::default()
    }

    /// True when both states point at the same chain head.
    ///
    /// `updated_at` is informational and ignored.
    pub fn same_position(&self, other: &ChainState) -> bool {
        self.chain_index == other.chain_index && self.last_hash == other.last_hash
    }

    /// The state after `record` has been appended.
    pub fn after(record: &WormRecord, updated_at: DateTime<Utc>) -> Self {
        Self {
            chain_index: record.chain_index + 1,
            last_hash: Some(record.hash.clone()),
            updated_at,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_hash {
            Some(hash) => write!(f, "index {} after {}", self.chain_index, hash),
            None => write!(f, "index {} (genesis)", self.chain_index),
        }
    }
}

/// ISO-8601 UTC timestamps with exactly three fractional digits.
///
/// The on-disk form must be stable across chrono versions because it feeds
/// the record hash.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
