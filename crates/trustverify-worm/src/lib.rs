//! # trustverify-worm
//!
//! Write-once, read-many storage for TrustVerify audit events.
//!
//! ## Overview
//!
//! Every event handed to [`WormStorage::write_record`] becomes a
//! [`WormRecord`](trustverify_contracts::record::WormRecord) whose SHA-256
//! hash covers the previous record's hash. Records are appended to
//! `YYYY/MM/DD` day-partitions and optionally sealed with AES-256-GCM.
//! Altering any stored record breaks its own hash and the link from its
//! successor, which [`audit_chain`] reports.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trustverify_contracts::{AuditEvent, WormConfig};
//! use trustverify_worm::WormStorage;
//!
//! let store = WormStorage::open(WormConfig::from_env()?)?;
//! let record = store.write_record(&AuditEvent::new("login.success"), None)?;
//! assert!(store.verify_record(&record));
//!
//! let today = record.timestamp.date_naive();
//! let audit = store.audit_range(today, today);
//! assert!(audit.is_intact());
//! ```

pub mod chain;
pub mod cipher;
pub mod partition;
pub mod state;
pub mod storage;

pub use chain::{audit_chain, verify_chain, verify_record, ChainAudit, ChainViolation};
pub use cipher::{Envelope, RecordCipher};
pub use state::{FileChainStateStore, InMemoryChainStateStore};
pub use storage::WormStorage;

// ── Tests ─────────────────────────────────────────────────────────────────────
