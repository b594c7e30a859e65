//! Error types for the WORM audit trail.
//!
//! All fallible operations return `WormResult<T>`. Variants carry enough
//! context for the caller to decide whether an operator must be alerted.

use thiserror::Error;

/// The unified error type for the TrustVerify WORM crates.
#[derive(Debug, Error)]
pub enum WormError {
    /// A directory or file operation on the record store failed.
    ///
    /// Fatal for `write_record`: an audit event that cannot be persisted is
    /// itself a security-relevant event.
    #[error("storage error at '{path}': {reason}")]
    Storage { path: String, reason: String },

    /// A record or chain state could not be encoded or decoded as JSON.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The record payload could not be encrypted.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// An envelope could not be decrypted (bad hex, wrong key, or tampered
    /// ciphertext failing the authentication tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// The persisted chain state moved underneath this writer.
    #[error("chain state conflict: expected {expected}, found {found}")]
    ChainConflict { expected: String, found: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// An internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {reason}")]
    LockPoisoned { reason: String },

    /// An earlier write reached disk without its chain state; writes stay
    /// refused until the store is reopened.
    #[error("writer halted: {reason}")]
    WriterHalted { reason: String },
}

impl WormError {
    /// Build a `Storage` error from an I/O failure on `path`.
    pub fn storage(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WormError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the TrustVerify crates.
pub type WormResult<T> = Result<T, WormError>;
