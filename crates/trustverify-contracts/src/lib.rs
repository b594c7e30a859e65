//! # trustverify-contracts
//!
//! Shared types, errors, and configuration for the TrustVerify WORM audit
//! trail.
//!
//! All crates in the workspace import from here. No storage logic lives in
//! this crate, only data definitions, the error type, and config loading.

pub mod config;
pub mod error;
pub mod record;

pub use config::WormConfig;
pub use error::{WormError, WormResult};
pub use record::{AuditEvent, ChainState, WormRecord};
