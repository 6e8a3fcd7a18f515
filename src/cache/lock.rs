//! Exclusive per-entry locks backed by sentinel files
//!
//! A lock on entry `P` is the file `P.lock`, created with no-clobber
//! semantics and holding a [`SentinelRecord`]. Whoever creates it owns the
//! entry until the [`CacheLock`] handle is released or dropped.
//!
//! A holder that dies leaves its sentinel behind. The next acquirer reads
//! the recorded owner, sees it is gone and reclaims the sentinel instead of
//! waiting on it forever.

use crate::cache::marker::{self, EntryState, SentinelRecord};
use crate::cache::owner::{Liveness, OwnerId};
use crate::config::LockConfig;
use crate::error::{CacheError, CacheResult};
use fs4::fs_std::FileExt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Non-live sentinels an immediate acquire will step over before giving up
const IMMEDIATE_RETRIES: u32 = 3;

/// How an acquire behaves when the entry is already locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Back off and retry until the configured bound
    Blocking,
    /// Fail with `Busy` straight away
    Immediate,
}

/// What currently sits at a sentinel path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// No sentinel
    Free,
    /// Sentinel with a readable owner
    Held {
        record: SentinelRecord,
        liveness: Liveness,
        stale: bool,
    },
    /// Sentinel that could not be parsed
    Unreadable { stale: bool },
}

impl LockStatus {
    fn is_stale(&self) -> bool {
        matches!(
            self,
            Self::Held { stale: true, .. } | Self::Unreadable { stale: true }
        )
    }
}

/// Acquires [`CacheLock`]s according to a [`LockConfig`] policy
#[derive(Debug, Clone, Default)]
pub struct Locker {
    config: LockConfig,
}

impl Locker {
    pub fn new(config: LockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Take the lock on `path`.
    ///
    /// Stale sentinels are reclaimed on the way. In `Immediate` mode a live
    /// holder yields `Busy`; in `Blocking` mode the call sleeps with
    /// exponential backoff and yields `Timeout` once `timeout_ms` or
    /// `max_attempts` is exhausted.
    pub fn acquire(&self, path: impl AsRef<Path>, mode: AcquireMode) -> CacheResult<CacheLock> {
        let path = path.as_ref().to_path_buf();
        let sentinel = marker::sentinel_path(&path);
        let record = SentinelRecord::new();
        let content = serde_json::to_vec(&record)?;

        let started = Instant::now();
        let timeout = self.config.timeout();
        let mut backoff = self.config.initial_backoff();
        let mut attempts: u32 = 0;
        let mut skipped: u32 = 0;
        let mut reclaimed_stale = false;

        loop {
            attempts += 1;
            let created = marker::create_exclusive(&sentinel, &content)
                .map_err(|e| CacheError::io("creating lock sentinel", &sentinel, e))?;
            if created {
                debug!(
                    path = %path.display(),
                    lock_id = %record.lock_id,
                    attempts,
                    "Acquired cache lock"
                );
                return Ok(CacheLock {
                    path,
                    sentinel,
                    mode,
                    record,
                    done: false,
                    reclaimed_stale,
                    released: false,
                });
            }

            let (status, observed) = self.probe(&sentinel)?;
            let live = match status {
                LockStatus::Free => false,
                ref status if status.is_stale() => {
                    if let Some(observed) = observed {
                        reclaimed_stale |= reclaim(&sentinel, &observed, status)?;
                    }
                    false
                }
                _ => true,
            };

            let waited = started.elapsed();
            if !live {
                skipped += 1;
                let exhausted = match mode {
                    AcquireMode::Immediate => skipped > IMMEDIATE_RETRIES,
                    AcquireMode::Blocking => self.exhausted(attempts, waited),
                };
                if !exhausted {
                    continue;
                }
            }

            match mode {
                AcquireMode::Immediate => {
                    debug!(path = %path.display(), "Cache lock busy");
                    return Err(CacheError::Busy { path });
                }
                AcquireMode::Blocking if self.exhausted(attempts, waited) => {
                    warn!(
                        path = %path.display(),
                        waited_ms = waited.as_millis() as u64,
                        attempts,
                        "Timed out waiting for cache lock"
                    );
                    return Err(CacheError::Timeout { path, waited });
                }
                AcquireMode::Blocking => {
                    thread::sleep(backoff.min(timeout.saturating_sub(waited)));
                    backoff = (backoff * 2).min(self.config.max_backoff());
                }
            }
        }
    }

    /// Take the lock, then report whether a complete entry is already there.
    ///
    /// The check happens under the lock, so no other cooperating process can
    /// create or remove the entry between the answer and the caller's next
    /// step.
    pub fn acquire_and_check_exists(
        &self,
        path: impl AsRef<Path>,
        mode: AcquireMode,
    ) -> CacheResult<(CacheLock, bool)> {
        let lock = self.acquire(path, mode)?;
        let existed = lock.entry_state()?.is_complete();
        Ok((lock, existed))
    }

    /// Describe the sentinel for `path` without touching it
    pub fn inspect(&self, path: impl AsRef<Path>) -> CacheResult<LockStatus> {
        let sentinel = marker::sentinel_path(path.as_ref());
        Ok(self.probe(&sentinel)?.0)
    }

    fn exhausted(&self, attempts: u32, waited: std::time::Duration) -> bool {
        waited >= self.config.timeout()
            || (self.config.max_attempts > 0 && attempts >= self.config.max_attempts)
    }

    /// Read a sentinel and judge its owner. Also returns the raw bytes so a
    /// reclaim can confirm it removes exactly what was judged.
    fn probe(&self, sentinel: &Path) -> CacheResult<(LockStatus, Option<Vec<u8>>)> {
        let raw = match fs::read(sentinel) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((LockStatus::Free, None)),
            Err(e) => return Err(CacheError::io("reading lock sentinel", sentinel, e)),
        };

        let status = match serde_json::from_slice::<SentinelRecord>(&raw) {
            Ok(record) => {
                let liveness = record.owner.liveness();
                let stale = match liveness {
                    Liveness::Alive => false,
                    Liveness::Dead => true,
                    Liveness::Unknown => match self.config.foreign_lock_ttl() {
                        Some(ttl) => older_than(sentinel, ttl),
                        None => false,
                    },
                };
                LockStatus::Held {
                    record,
                    liveness,
                    stale,
                }
            }
            Err(_) => LockStatus::Unreadable {
                stale: older_than(sentinel, self.config.corrupt_lock_grace()),
            },
        };
        Ok((status, Some(raw)))
    }
}

fn older_than(path: &Path, limit: std::time::Duration) -> bool {
    marker::age(path).map(|age| age >= limit).unwrap_or(false)
}

/// Remove a stale sentinel if it is still the one that was judged stale.
///
/// Reclaimers of one sentinel serialize on an advisory lock over the
/// `.reclaim` guard file, which the OS drops if the holder dies. Under it
/// the sentinel is re-read and deleted only if its bytes are still
/// `observed`. Every sentinel carries a fresh `lock_id`, so once the stale
/// one is gone no later sentinel can match and nothing live is deleted.
///
/// The guard file outlives the reclaim; it is only deleted together with
/// the entry, by a lock holder.
fn reclaim(sentinel: &Path, observed: &[u8], status: &LockStatus) -> CacheResult<bool> {
    let guard_path = marker::reclaim_guard_path(sentinel);
    let guard = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&guard_path)
        .map_err(|e| CacheError::io("opening reclaim guard", &guard_path, e))?;
    FileExt::lock_exclusive(&guard)
        .map_err(|e| CacheError::io("locking reclaim guard", &guard_path, e))?;

    let current = match fs::read(sentinel) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CacheError::io("reading lock sentinel", sentinel, e)),
    };
    if current != observed {
        debug!(sentinel = %sentinel.display(), "Sentinel changed before reclaim; leaving it");
        return Ok(false);
    }

    marker::remove_if_present(sentinel)
        .map_err(|e| CacheError::io("removing stale lock sentinel", sentinel, e))?;

    match status {
        LockStatus::Held { record, liveness, .. } => info!(
            sentinel = %sentinel.display(),
            owner = %record.owner,
            liveness = %liveness,
            "Reclaimed stale cache lock"
        ),
        _ => info!(sentinel = %sentinel.display(), "Reclaimed unreadable cache lock"),
    }
    Ok(true)
}

/// An exclusive claim on one cache entry.
///
/// Dropping the handle releases the lock without marking the entry done.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    sentinel: PathBuf,
    mode: AcquireMode,
    record: SentinelRecord,
    done: bool,
    reclaimed_stale: bool,
    released: bool,
}

impl CacheLock {
    /// The entry this lock guards
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AcquireMode {
        self.mode
    }

    pub fn owner(&self) -> &OwnerId {
        &self.record.owner
    }

    pub fn record(&self) -> &SentinelRecord {
        &self.record
    }

    /// Whether `mark_done` has been called through this handle
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether a dead holder's sentinel was removed to get this lock
    pub fn reclaimed_stale(&self) -> bool {
        self.reclaimed_stale
    }

    /// Current state of the guarded entry
    pub fn entry_state(&self) -> CacheResult<EntryState> {
        marker::entry_state(&self.path)
    }

    /// Record the entry's current content as complete
    pub fn mark_done(&mut self) -> CacheResult<()> {
        let record = marker::write_done(&self.path)?;
        self.done = true;
        debug!(path = %self.path.display(), size = record.size, "Marked cache entry done");
        Ok(())
    }

    /// Release the lock, optionally marking the entry done first.
    ///
    /// If marking fails the lock is still released and the error returned.
    pub fn release(mut self, mark_done: bool) -> CacheResult<()> {
        if mark_done {
            self.mark_done()?;
        }
        self.release_sentinel()
    }

    /// Delete the entry's content and done marker, then release
    pub fn remove(mut self) -> CacheResult<()> {
        remove_entry_files(&self.path)?;
        self.done = false;
        self.release_sentinel()
    }

    fn release_sentinel(&mut self) -> CacheResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let raw = match fs::read(&self.sentinel) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Lock sentinel vanished before release");
                return Ok(());
            }
            Err(e) => return Err(CacheError::io("reading lock sentinel", &self.sentinel, e)),
        };

        let ours = serde_json::from_slice::<SentinelRecord>(&raw)
            .map(|current| current.lock_id == self.record.lock_id)
            .unwrap_or(false);
        if !ours {
            warn!(
                path = %self.path.display(),
                "Lock sentinel was replaced by another owner; leaving it in place"
            );
            return Ok(());
        }

        marker::remove_if_present(&self.sentinel)
            .map_err(|e| CacheError::io("removing lock sentinel", &self.sentinel, e))?;
        debug!(path = %self.path.display(), done = self.done, "Released cache lock");
        Ok(())
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_sentinel() {
            warn!(path = %self.path.display(), error = %e, "Failed to release cache lock");
        }
    }
}

/// Delete an entry's content, done marker and reclaim guard, ignoring what
/// is already gone. Only called with the entry's lock held.
pub(crate) fn remove_entry_files(path: &Path) -> CacheResult<()> {
    marker::remove_if_present(path).map_err(|e| CacheError::io("removing entry", path, e))?;
    let done = marker::done_path(path);
    marker::remove_if_present(&done)
        .map_err(|e| CacheError::io("removing done marker", &done, e))?;
    let guard = marker::reclaim_guard_path(&marker::sentinel_path(path));
    marker::remove_if_present(&guard)
        .map_err(|e| CacheError::io("removing reclaim guard", &guard, e))?;
    Ok(())
}
