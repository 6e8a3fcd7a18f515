//! Guarded reads and writes of cache entry content
//!
//! Every operation runs under the entry's lock. Given a path, the store
//! takes a blocking lock for the duration of the call; given a handle the
//! caller already holds, it works through that handle and leaves locking
//! and completion to the caller.

use crate::cache::lock::{self, AcquireMode, CacheLock, Locker};
use crate::cache::marker;
use crate::error::{CacheError, CacheResult};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Produces the bytes of an entry.
///
/// The artifact format belongs to the caller; the store only needs the
/// bytes.
pub trait Serializable {
    fn serialize_into(&self, out: &mut Vec<u8>) -> Result<(), String>;
}

/// Serializes any serde type as JSON
pub struct Json<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> Serializable for Json<'_, T> {
    fn serialize_into(&self, out: &mut Vec<u8>) -> Result<(), String> {
        serde_json::to_writer(out, self.0).map_err(|e| e.to_string())
    }
}

/// Which entry an operation targets
#[derive(Debug)]
pub enum EntryRef<'a> {
    /// Lock the path for the duration of the operation
    Path(&'a Path),
    /// Reuse a lock the caller already holds
    Held(&'a CacheLock),
}

impl<'a> From<&'a Path> for EntryRef<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for EntryRef<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Self::Path(path.as_path())
    }
}

impl<'a> From<&'a CacheLock> for EntryRef<'a> {
    fn from(lock: &'a CacheLock) -> Self {
        Self::Held(lock)
    }
}

impl<'a> From<&'a mut CacheLock> for EntryRef<'a> {
    fn from(lock: &'a mut CacheLock) -> Self {
        Self::Held(lock)
    }
}

/// Content read from a complete entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryData {
    pub bytes: Vec<u8>,
    pub size: u64,
}

/// What a write actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Content replaced
    Written,
    /// Content extended
    Appended,
    /// Existing content was identical; file left untouched
    Skipped,
}

/// Guarded access to cache entries.
///
/// A caller that already holds an entry's [`CacheLock`] must pass the
/// handle, not the path. A path always takes a fresh lock, and that waits
/// on the caller's own lock until `timeout_ms` runs out.
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    locker: Locker,
}

impl EntryStore {
    pub fn new(locker: Locker) -> Self {
        Self { locker }
    }

    pub fn locker(&self) -> &Locker {
        &self.locker
    }

    /// Read a complete entry.
    ///
    /// Fails with `NotFound` when the content or its done marker is missing,
    /// or the content no longer matches the marker.
    pub fn read_entry<'a>(&self, entry: impl Into<EntryRef<'a>>) -> CacheResult<EntryData> {
        self.guarded(entry.into(), |_| false, read)
    }

    /// Write or append `bytes`.
    ///
    /// Whole-content writes replace the file in one rename; with
    /// `skip_if_identical` an identical file is left alone so its mtime is
    /// preserved. Appends go through `O_APPEND`.
    pub fn write_entry<'a>(
        &self,
        entry: impl Into<EntryRef<'a>>,
        bytes: &[u8],
        append: bool,
        skip_if_identical: bool,
    ) -> CacheResult<WriteOutcome> {
        self.guarded(
            entry.into(),
            |_| true,
            |lock| write(lock.path(), bytes, append, skip_if_identical),
        )
    }

    /// Create an empty entry if there is none; existing content is kept
    pub fn touch_entry<'a>(&self, entry: impl Into<EntryRef<'a>>) -> CacheResult<()> {
        // Only an entry this call created is known to be complete
        self.guarded(entry.into(), |created| *created, |lock| touch(lock.path()))
            .map(|_| ())
    }

    /// Write the bytes `object` serializes to
    pub fn write_serialized<'a>(
        &self,
        object: &dyn Serializable,
        entry: impl Into<EntryRef<'a>>,
        skip_if_identical: bool,
    ) -> CacheResult<WriteOutcome> {
        self.guarded(
            entry.into(),
            |_| true,
            |lock| {
                let mut bytes = Vec::new();
                object
                    .serialize_into(&mut bytes)
                    .map_err(|reason| CacheError::Serialize {
                        path: lock.path().to_path_buf(),
                        reason,
                    })?;
                write(lock.path(), &bytes, false, skip_if_identical)
            },
        )
    }

    /// Delete content, done marker and sentinel. Removing an absent entry
    /// is not an error.
    ///
    /// Through a held handle the sentinel stays until that handle is
    /// released; use [`CacheLock::remove`] to do both at once.
    pub fn remove_entry<'a>(&self, entry: impl Into<EntryRef<'a>>) -> CacheResult<()> {
        match entry.into() {
            EntryRef::Held(lock) => lock::remove_entry_files(lock.path()),
            EntryRef::Path(path) => self.remove_path(path, AcquireMode::Blocking),
        }
    }

    /// Lock `path` in `mode`, then delete the entry and its sentinel.
    ///
    /// An entry whose directory is already gone counts as removed.
    pub fn remove_path(&self, path: &Path, mode: AcquireMode) -> CacheResult<()> {
        match self.locker.acquire(path, mode) {
            Ok(lock) => lock.remove(),
            Err(e) if e.is_not_found() && !marker::parent_dir(path).exists() => {
                debug!(path = %path.display(), "Entry directory gone, nothing to remove");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Run `op` under the entry's lock. For a path, the lock is released
    /// afterwards and the entry marked done when `op` succeeded and
    /// `mark_done` says so.
    fn guarded<T>(
        &self,
        entry: EntryRef<'_>,
        mark_done: impl FnOnce(&T) -> bool,
        op: impl FnOnce(&CacheLock) -> CacheResult<T>,
    ) -> CacheResult<T> {
        match entry {
            EntryRef::Held(lock) => op(lock),
            EntryRef::Path(path) => {
                let lock = self.locker.acquire(path, AcquireMode::Blocking)?;
                // On error the handle drops and releases without marking
                let value = op(&lock)?;
                let mark = mark_done(&value);
                lock.release(mark)?;
                Ok(value)
            }
        }
    }
}

fn read(lock: &CacheLock) -> CacheResult<EntryData> {
    let path = lock.path();
    let bytes = fs::read(path).map_err(|e| CacheError::io("reading entry", path, e))?;
    match marker::read_done(path)? {
        Some(done) if done.matches(&bytes) => {
            let size = bytes.len() as u64;
            Ok(EntryData { bytes, size })
        }
        Some(_) => {
            debug!(path = %path.display(), "Entry changed since it was marked done");
            Err(CacheError::NotFound(path.to_path_buf()))
        }
        None => Err(CacheError::NotFound(marker::done_path(path))),
    }
}

fn write(path: &Path, bytes: &[u8], append: bool, skip_if_identical: bool) -> CacheResult<WriteOutcome> {
    if append {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CacheError::io("opening entry for append", path, e))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_data())
            .map_err(|e| CacheError::io("appending to entry", path, e))?;
        debug!(path = %path.display(), size = bytes.len(), "Appended to cache entry");
        return Ok(WriteOutcome::Appended);
    }

    if skip_if_identical && is_identical(path, bytes)? {
        debug!(path = %path.display(), "Cache entry unchanged, skipping write");
        return Ok(WriteOutcome::Skipped);
    }

    marker::write_atomic(path, bytes).map_err(|e| CacheError::io("writing entry", path, e))?;
    debug!(path = %path.display(), size = bytes.len(), "Wrote cache entry");
    Ok(WriteOutcome::Written)
}

fn is_identical(path: &Path, bytes: &[u8]) -> CacheResult<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() != bytes.len() as u64 => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CacheError::io("inspecting entry", path, e)),
    }
    let existing = fs::read(path).map_err(|e| CacheError::io("reading entry", path, e))?;
    Ok(existing == bytes)
}

fn touch(path: &Path) -> CacheResult<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(CacheError::io("touching entry", path, e)),
    }
}
