//! Hash-chain primitives: hashing, single-record verification, and full
//! chain audits.
//!
//! Hash input layout (bytes, in order):
//!   1. previous_hash as UTF-8 bytes (64 ASCII hex chars), omitted for the
//!      first record
//!   2. canonical JSON of `{id, timestamp, eventType, data}`
//!
//! `chain_index` is not hashed; adjacency is checked by `audit_chain`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use trustverify_contracts::{
    error::WormResult,
    record::{iso_millis, WormRecord},
};

/// The hashed view of a record. Field order is part of the hash contract.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalRecord<'a> {
    id: &'a str,
    timestamp: String,
    event_type: &'a str,
    data: &'a Value,
}

/// Serialize the hashed fields of a record deterministically.
///
/// `serde_json` keeps object keys sorted, so equal `data` values always
/// produce identical bytes.
pub fn canonical_bytes(
    id: &str,
    timestamp: &DateTime<Utc>,
    event_type: &str,
    data: &Value,
) -> WormResult<Vec<u8>> {
    let canonical = CanonicalRecord {
        id,
        timestamp: iso_millis::format(timestamp),
        event_type,
        data,
    };
    Ok(serde_json::to_vec(&canonical)?)
}

/// SHA-256 over `previous_hash || canonical`, as lowercase hex.
pub fn compute_hash(previous_hash: Option<&str>, canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = previous_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(canonical);
    hex::encode(hasher.finalize())
}

/// Recompute the hash a record should carry from its declared fields.
pub fn hash_record(record: &WormRecord) -> WormResult<String> {
    let canonical = canonical_bytes(
        &record.id,
        &record.timestamp,
        &record.event_type,
        &record.data,
    )?;
    Ok(compute_hash(record.previous_hash.as_deref(), &canonical))
}

/// Local self-consistency check for one record.
///
/// Does not look at neighbouring records; use `audit_chain` for that.
pub fn verify_record(record: &WormRecord) -> bool {
    hash_record(record).is_ok_and(|expected| expected == record.hash)
}

/// One way a sequence of records can fail to form a valid chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    /// The stored hash does not match the record's own fields.
    HashMismatch { chain_index: u64, id: String },

    /// `previous_hash` does not equal the predecessor's `hash`.
    BrokenLink {
        chain_index: u64,
        expected: Option<String>,
        found: Option<String>,
    },

    /// Indices are not consecutive (missing or duplicated records).
    Discontinuity { previous_index: u64, chain_index: u64 },
}

/// The outcome of auditing a run of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainAudit {
    pub records_checked: usize,
    pub first_index: Option<u64>,
    pub last_index: Option<u64>,
    pub violations: Vec<ChainViolation>,
}

impl ChainAudit {
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Walk `records` in chain order and report every violation found.
///
/// Rules:
///
/// 1. **Hash correctness**: every record passes `verify_record`.
/// 2. **Continuity**: consecutive records have consecutive `chain_index`.
/// 3. **Linkage**: for consecutive records, `next.previous_hash ==
///    prev.hash`; the record at index 0 has no `previous_hash`.
///
/// The input may start mid-chain (e.g. a date-range read); only the
/// genesis record's predecessor is checked against "none". An empty slice
/// is intact.
pub fn audit_chain(records: &[WormRecord]) -> ChainAudit {
    let mut ordered: Vec<&WormRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.chain_index);

    let mut audit = ChainAudit {
        records_checked: ordered.len(),
        first_index: ordered.first().map(|r| r.chain_index),
        last_index: ordered.last().map(|r| r.chain_index),
        violations: Vec::new(),
    };

    let mut previous: Option<&WormRecord> = None;
    for record in ordered {
        if !verify_record(record) {
            audit.violations.push(ChainViolation::HashMismatch {
                chain_index: record.chain_index,
                id: record.id.clone(),
            });
        }

        match previous {
            None if record.chain_index == 0 && record.previous_hash.is_some() => {
                audit.violations.push(ChainViolation::BrokenLink {
                    chain_index: 0,
                    expected: None,
                    found: record.previous_hash.clone(),
                });
            }
            None => {}
            Some(prev) if record.chain_index != prev.chain_index + 1 => {
                audit.violations.push(ChainViolation::Discontinuity {
                    previous_index: prev.chain_index,
                    chain_index: record.chain_index,
                });
            }
            Some(prev) => {
                if record.previous_hash.as_deref() != Some(prev.hash.as_str()) {
                    audit.violations.push(ChainViolation::BrokenLink {
                        chain_index: record.chain_index,
                        expected: Some(prev.hash.clone()),
                        found: record.previous_hash.clone(),
                    });
                }
            }
        }

        previous = Some(record);
    }

    audit
}

/// `true` when `audit_chain` finds no violations.
pub fn verify_chain(records: &[WormRecord]) -> bool {
    audit_chain(records).is_intact()
}
