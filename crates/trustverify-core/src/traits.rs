//! Core trait definitions for the WORM audit trail.
//!
//! These two traits are the seams the storage service is built around:
//!
//! - `ChainStateStore`: where the head of the hash chain is persisted
//! - `Clock`: where record timestamps come from
//!
//! Both are injected at construction so tests can substitute in-memory or
//! fixed implementations, and deployments can back the chain state with a
//! transactional store instead of a flat file.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use trustverify_contracts::{error::WormResult, record::ChainState};

/// Durable storage for the chain head `(chain_index, last_hash)`.
///
/// Writers advance the chain with `compare_and_swap`. Implementations must
/// make the compare and the write atomic for every writer sharing the state,
/// including writers in other processes, so no two of them claim the same
/// chain index.
pub trait ChainStateStore: Send + Sync {
    /// Return the persisted state, or `ChainState::genesis()` if none exists.
    fn load(&self) -> WormResult<ChainState>;

    /// Persist `next` only if the stored state is at the same position as
    /// `expected`.
    ///
    /// Returns `WormError::ChainConflict` without writing when the stored
    /// position differs. Implementations must make the state durable before
    /// returning `Ok`.
    fn compare_and_swap(&self, expected: &ChainState, next: &ChainState) -> WormResult<()>;

    /// Overwrite the persisted state unconditionally.
    ///
    /// Reserved for recovery paths that rebuild the head from on-disk records.
    fn save(&self, state: &ChainState) -> WormResult<()>;
}

/// Source of record timestamps.
///
/// The store, never the caller, assigns timestamps so events cannot be
/// backdated.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// A clock that only moves when told to.
///
/// Lets callers place records on chosen days, e.g. to exercise range reads
/// and retention cleanup. Share it with the store through an `Arc`.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
