//! The WORM storage service.
//!
//! `WormStorage` appends hash-chained records to day-partitioned files,
//! reads them back by date range, verifies them, and purges whole
//! day-partitions once they fall outside the retention window.
//!
//! All writes go through one mutex that owns the cached chain head, so
//! concurrent callers are serialized and the chain stays gap-free. The head
//! is advanced in the `ChainStateStore` with compare-and-swap, which also
//! catches a second process writing to the same store.
//!
//! If a record reaches disk but the chain state cannot be persisted, the
//! writer halts: every later `write_record` fails until the store is reopened
//! and tail recovery has rebuilt the head.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Datelike, Duration, NaiveDate, SubsecRound, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use trustverify_contracts::{
    config::WormConfig,
    error::{WormError, WormResult},
    record::{AuditEvent, ChainState, WormRecord},
};
use trustverify_core::traits::{ChainStateStore, Clock, SystemClock};

use crate::{
    chain::{self, ChainAudit},
    cipher::{Envelope, RecordCipher},
    partition,
    state::FileChainStateStore,
};

const ID_SUFFIX_LEN: usize = 9;

/// The cached chain head plus the reason writes are refused, if they are.
#[derive(Debug)]
struct WriteHead {
    state: ChainState,
    halted: Option<String>,
}

/// Durable, append-only, tamper-evident audit record storage.
///
/// # Thread safety
///
/// `WormStorage` is `Send + Sync`. Share it behind an `Arc`; writes are
/// serialized internally and reads take no lock.
pub struct WormStorage {
    config: WormConfig,
    cipher: Option<RecordCipher>,
    state_store: Box<dyn ChainStateStore>,
    clock: Box<dyn Clock>,
    head: Mutex<WriteHead>,
}

impl WormStorage {
    /// Open a store with the file-backed chain state and the wall clock.
    pub fn open(config: WormConfig) -> WormResult<Self> {
        let state_store = FileChainStateStore::in_root(&config.storage_path);
        Self::with_components(config, Box::new(state_store), Box::new(SystemClock))
    }

    /// Open a store with caller-supplied chain state storage and clock.
    ///
    /// Validates `config`, creates the storage root, derives the cipher key,
    /// loads the chain head, and reconciles it with the newest partition.
    pub fn with_components(
        config: WormConfig,
        state_store: Box<dyn ChainStateStore>,
        clock: Box<dyn Clock>,
    ) -> WormResult<Self> {
        config.validate()?;

        fs::create_dir_all(&config.storage_path)
            .map_err(|e| WormError::storage(&config.storage_path, e))?;

        let cipher = if config.enable_encryption {
            config
                .encryption_key
                .as_deref()
                .map(RecordCipher::from_secret)
                .transpose()?
        } else {
            None
        };

        if config.enable_compression {
            info!("enable_compression is set; records are stored uncompressed");
        }

        let persisted = state_store.load()?;
        let storage = Self {
            config,
            cipher,
            state_store,
            clock,
            head: Mutex::new(WriteHead {
                state: persisted,
                halted: None,
            }),
        };
        storage.recover_from_tail()?;

        info!(
            path = %storage.root().display(),
            encrypted = storage.cipher.is_some(),
            retention_days = storage.config.retention_days,
            "WORM store opened"
        );

        Ok(storage)
    }

    pub fn config(&self) -> &WormConfig {
        &self.config
    }

    fn root(&self) -> &Path {
        &self.config.storage_path
    }

    /// Snapshot of the chain head: the next index and the last hash.
    pub fn chain_state(&self) -> WormResult<ChainState> {
        Ok(self.lock_head()?.state.clone())
    }

    fn lock_head(&self) -> WormResult<MutexGuard<'_, WriteHead>> {
        self.head.lock().map_err(|e| WormError::LockPoisoned {
            reason: format!("WORM write lock poisoned: {}", e),
        })
    }

    // ── Write path ────────────────────────────────────────────────────────────

    /// Append one audit event to the chain.
    ///
    /// The record's `data` is the event (including `eventType`) with
    /// `metadata` merged in under the `"metadata"` key when given.
    /// `data.eventType` always equals `event.event_type`, even when the
    /// event carries a field of that name.
    ///
    /// On success the record line is synced to its day-partition and the
    /// chain state is persisted. On any error the in-memory head is left at
    /// its previous value and the error is returned. If the line was
    /// appended but the state could not be persisted, the writer halts and
    /// later calls return `WormError::WriterHalted`.
    pub fn write_record(&self, event: &AuditEvent, metadata: Option<Value>) -> WormResult<WormRecord> {
        let mut head = self.lock_head()?;
        if let Some(reason) = &head.halted {
            return Err(WormError::WriterHalted {
                reason: reason.clone(),
            });
        }

        let timestamp = self.clock.now().trunc_subsecs(3);
        let id = generate_record_id(&timestamp);
        let data = record_data(event, metadata)?;

        let canonical = chain::canonical_bytes(&id, &timestamp, &event.event_type, &data)?;
        let hash = chain::compute_hash(head.state.last_hash.as_deref(), &canonical);

        let record = WormRecord {
            id,
            timestamp,
            event_type: event.event_type.clone(),
            data,
            hash,
            previous_hash: head.state.last_hash.clone(),
            chain_index: head.state.chain_index,
        };

        let line = self.encode_line(&record)?;

        let dir = partition::day_dir(self.root(), timestamp.date_naive());
        fs::create_dir_all(&dir).map_err(|e| WormError::storage(&dir, e))?;
        let path = dir.join(partition::record_file_name(&timestamp, &record.id));
        partition::append_line(&path, &line).map_err(|e| WormError::storage(&path, e))?;

        let next = ChainState::after(&record, self.clock.now());
        if let Err(err) = self.state_store.compare_and_swap(&head.state, &next) {
            if matches!(err, WormError::ChainConflict { .. }) {
                warn!(
                    chain_index = record.chain_index,
                    error = %err,
                    "chain state moved underneath writer; reloading head"
                );
                head.state = self.state_store.load()?;
            } else {
                error!(
                    chain_index = record.chain_index,
                    path = %path.display(),
                    error = %err,
                    "record appended but chain state not persisted; halting writer until reopen"
                );
                head.halted = Some(format!(
                    "record #{} was appended but the chain state was not persisted: {}",
                    record.chain_index, err
                ));
            }
            return Err(err);
        }
        head.state = next;

        info!(
            id = %record.id,
            event_type = %record.event_type,
            chain_index = record.chain_index,
            "WORM record written"
        );
        debug!(path = %path.display(), hash = %record.hash, "record appended");

        Ok(record)
    }

    fn encode_line(&self, record: &WormRecord) -> WormResult<String> {
        let json = serde_json::to_string(record)?;
        match &self.cipher {
            Some(cipher) => Ok(serde_json::to_string(&cipher.seal(json.as_bytes())?)?),
            None => Ok(json),
        }
    }

    // ── Verification ──────────────────────────────────────────────────────────

    /// Recompute `record.hash` from its declared fields. Local check only.
    pub fn verify_record(&self, record: &WormRecord) -> bool {
        chain::verify_record(record)
    }

    /// Read every record in `[start, end]` and audit the chain they form.
    pub fn audit_range(&self, start: NaiveDate, end: NaiveDate) -> ChainAudit {
        chain::audit_chain(&self.read_records(start, end, None))
    }

    // ── Read path ─────────────────────────────────────────────────────────────

    /// All records created on days `start..=end`, optionally filtered by
    /// `event_type`, sorted ascending by timestamp (ties by chain index).
    ///
    /// A file containing any line that cannot be decrypted or parsed is
    /// logged and skipped as a whole; other files are still returned.
    pub fn read_records(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        event_type: Option<&str>,
    ) -> Vec<WormRecord> {
        let mut records = Vec::new();

        for day in partition::days_between(start, end) {
            let dir = partition::day_dir(self.root(), day);
            if !dir.is_dir() {
                continue;
            }

            let files = match partition::record_files(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "cannot list WORM partition; skipping");
                    continue;
                }
            };

            for file in files {
                match self.read_file(&file) {
                    Ok(found) => records.extend(
                        found
                            .into_iter()
                            .filter(|r| event_type.map_or(true, |t| r.event_type == t)),
                    ),
                    Err(e) => {
                        warn!(path = %file.display(), error = %e, "unreadable WORM file; skipping");
                    }
                }
            }
        }

        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.chain_index.cmp(&b.chain_index))
        });

        debug!(
            start = %start,
            end = %end,
            event_type = event_type.unwrap_or("*"),
            count = records.len(),
            "WORM records read"
        );

        records
    }

    fn read_file(&self, path: &Path) -> WormResult<Vec<WormRecord>> {
        let raw = fs::read_to_string(path).map_err(|e| WormError::storage(path, e))?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| self.decode_line(line))
            .collect()
    }

    fn decode_line(&self, line: &str) -> WormResult<WormRecord> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("encrypted").is_none() {
            return Ok(serde_json::from_value(value)?);
        }

        let cipher = self.cipher.as_ref().ok_or_else(|| WormError::Decryption {
            reason: "record is encrypted but no encryption key is configured".to_string(),
        })?;
        let envelope: Envelope = serde_json::from_value(value)?;
        let plaintext = cipher.open(&envelope)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    // ── Recovery ──────────────────────────────────────────────────────────────

    /// Rebuild the head from the newest partition if it is ahead of the
    /// persisted state.
    ///
    /// A crash between appending a record and saving the state leaves the
    /// record on disk with the state one step behind. Without this the next
    /// write would reuse the index and fork the chain.
    fn recover_from_tail(&self) -> WormResult<()> {
        let Some(dir) = partition::latest_day_dir(self.root())
            .map_err(|e| WormError::storage(self.root(), e))?
        else {
            return Ok(());
        };

        let files = partition::record_files(&dir).map_err(|e| WormError::storage(&dir, e))?;
        let tail = files
            .iter()
            .filter_map(|file| match self.read_file(file) {
                Ok(records) => Some(records),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "unreadable WORM file during recovery");
                    None
                }
            })
            .flatten()
            .max_by_key(|r| r.chain_index);

        let mut head = self.lock_head()?;
        if let Some(last) = tail.filter(|r| r.chain_index >= head.state.chain_index) {
            let rebuilt = ChainState::after(&last, self.clock.now());
            warn!(
                persisted = %head.state,
                rebuilt = %rebuilt,
                "chain state lagged behind stored records; rebuilt from newest partition"
            );
            self.state_store.save(&rebuilt)?;
            head.state = rebuilt;
        }

        Ok(())
    }

    // ── Retention ─────────────────────────────────────────────────────────────

    /// Delete every day-partition older than `now - retention_days`.
    ///
    /// Whole years and months are removed when they lie entirely before the
    /// cutoff; inside the cutoff month only earlier days go. A partition that
    /// fails to delete is logged and skipped. Returns the number of
    /// directories removed.
    pub fn cleanup_old_records(&self) -> WormResult<usize> {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(Duration::days(i64::from(self.config.retention_days)))
            .map_or(NaiveDate::MIN, |t| t.date_naive());

        let removed = sweep_expired(self.root(), cutoff, |dir| fs::remove_dir_all(dir))?;

        info!(cutoff = %cutoff, removed, "retention cleanup finished");
        Ok(removed)
    }
}

/// Remove every partition under `root` dated before `cutoff` using `remove`.
///
/// A failed removal is logged and the walk moves on; only successful
/// removals are counted.
fn sweep_expired<F>(root: &Path, cutoff: NaiveDate, mut remove: F) -> WormResult<usize>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let cutoff_year = u32::try_from(cutoff.year()).unwrap_or(0);
    let mut expire = |dir: &Path| match remove(dir) {
        Ok(()) => {
            info!(path = %dir.display(), "expired partition removed");
            1
        }
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to remove expired partition");
            0
        }
    };

    let mut removed = 0;
    let years = partition::numeric_subdirs(root).map_err(|e| WormError::storage(root, e))?;

    for (year, year_dir) in years {
        if year < cutoff_year {
            removed += expire(&year_dir);
            continue;
        }
        if year > cutoff_year {
            continue;
        }

        for (month, month_dir) in subdirs_or_warn(&year_dir) {
            if month < cutoff.month() {
                removed += expire(&month_dir);
                continue;
            }
            if month > cutoff.month() {
                continue;
            }

            for (day, day_dir) in subdirs_or_warn(&month_dir) {
                if day < cutoff.day() {
                    removed += expire(&day_dir);
                }
            }
        }
    }

    Ok(removed)
}

fn subdirs_or_warn(dir: &Path) -> Vec<(u32, PathBuf)> {
    partition::numeric_subdirs(dir).unwrap_or_else(|e| {
        warn!(path = %dir.display(), error = %e, "cannot list partition during cleanup");
        Vec::new()
    })
}

/// `<unix-millis>-<9 lowercase alphanumerics>`.
fn generate_record_id(timestamp: &DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}", timestamp.timestamp_millis(), suffix)
}

fn record_data(event: &AuditEvent, metadata: Option<Value>) -> WormResult<Value> {
    let mut data = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut data {
        // A field named `eventType` would otherwise shadow the category.
        map.insert("eventType".to_string(), Value::String(event.event_type.clone()));
        if let Some(meta) = metadata {
            map.insert("metadata".to_string(), meta);
        }
    }
    Ok(data)
}
