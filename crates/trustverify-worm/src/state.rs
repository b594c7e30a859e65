//! `ChainStateStore` implementations.
//!
//! `FileChainStateStore` is the production store: a JSON document at
//! `<root>/.chain-state.json`, replaced atomically through a temporary
//! sibling file and `rename`. Compare-and-swap runs under an exclusive
//! advisory lock on `<root>/.chain-state.lock`, so separate processes (or
//! separate store instances) sharing a root serialize their updates.
//! `InMemoryChainStateStore` keeps the state in a `Mutex` and is meant for
//! tests and throwaway stores.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use fd_lock::RwLock;
use tracing::debug;

use trustverify_contracts::{
    error::{WormError, WormResult},
    record::ChainState,
};
use trustverify_core::traits::ChainStateStore;

use crate::partition::CHAIN_STATE_FILE;

fn conflict(expected: &ChainState, found: &ChainState) -> WormError {
    WormError::ChainConflict {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn poisoned(err: impl std::fmt::Display) -> WormError {
    WormError::LockPoisoned {
        reason: format!("chain state lock poisoned: {}", err),
    }
}

// ── File-backed store ─────────────────────────────────────────────────────────

/// Chain state persisted as `{ chainIndex, lastHash, updatedAt }`.
///
/// The document is overwritten, never appended. Compare-and-swap holds an
/// in-process mutex and an exclusive file lock across the
/// read-compare-write sequence.
#[derive(Debug)]
pub struct FileChainStateStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

impl FileChainStateStore {
    /// Store the state in `<root>/.chain-state.json`.
    pub fn in_root(root: &Path) -> Self {
        Self::at(root.join(CHAIN_STATE_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: path.with_extension("lock"),
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> WormResult<ChainState> {
        if !self.path.exists() {
            return Ok(ChainState::genesis());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| WormError::storage(&self.path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Run `f` while holding the exclusive lock on the lock file.
    fn exclusive<T>(&self, f: impl FnOnce() -> WormResult<T>) -> WormResult<T> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| WormError::storage(&self.lock_path, e))?;
        let mut locker = RwLock::new(file);
        let _guard = locker
            .write()
            .map_err(|e| WormError::storage(&self.lock_path, e))?;
        f()
    }

    fn write(&self, state: &ChainState) -> WormResult<()> {
        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = File::create(&tmp).map_err(|e| WormError::storage(&tmp, e))?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| WormError::storage(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| WormError::storage(&self.path, e))?;

        debug!(path = %self.path.display(), state = %state, "chain state persisted");
        Ok(())
    }
}

impl ChainStateStore for FileChainStateStore {
    fn load(&self) -> WormResult<ChainState> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        self.read()
    }

    fn compare_and_swap(&self, expected: &ChainState, next: &ChainState) -> WormResult<()> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        self.exclusive(|| {
            let current = self.read()?;
            if !current.same_position(expected) {
                return Err(conflict(expected, &current));
            }
            self.write(next)
        })
    }

    fn save(&self, state: &ChainState) -> WormResult<()> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        self.exclusive(|| self.write(state))
    }
}

// ── In-memory store ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryChainStateStore {
    state: Mutex<ChainState>,
}

impl InMemoryChainStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing head instead of genesis.
    pub fn with_state(state: ChainState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl ChainStateStore for InMemoryChainStateStore {
    fn load(&self) -> WormResult<ChainState> {
        Ok(self.state.lock().map_err(poisoned)?.clone())
    }

    fn compare_and_swap(&self, expected: &ChainState, next: &ChainState) -> WormResult<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if !state.same_position(expected) {
            return Err(conflict(expected, &state));
        }
        *state = next.clone();
        Ok(())
    }

    fn save(&self, state: &ChainState) -> WormResult<()> {
        *self.state.lock().map_err(poisoned)? = state.clone();
        Ok(())
    }
}
