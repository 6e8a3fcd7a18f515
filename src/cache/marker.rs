//! On-disk markers co-located with a cache entry
//!
//! For an entry at `P`:
//!
//! | File | Lifetime | Content |
//! |------|----------|---------|
//! | `P.lock` | while a lock is held | [`SentinelRecord`] |
//! | `P.done` | from `mark_done` until the entry is removed | [`DoneRecord`] |
//! | `P.lock.reclaim` | from the first stale reclaim until the entry is removed | empty |
//!
//! Sentinel and done marker are written through a temp file in the same directory so a reader
//! never sees a half-written record.

use crate::cache::owner::OwnerId;
use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;
use uuid::Uuid;

const LOCK_SUFFIX: &str = ".lock";
const DONE_SUFFIX: &str = ".done";
const RECLAIM_SUFFIX: &str = ".reclaim";
const TEMP_PREFIX: &str = ".cachelock-";
const TEMP_SUFFIX: &str = ".tmp";

/// State of a cache entry as seen by a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// No content at the path
    Missing,
    /// Content exists but was never completed, or changed since
    Building,
    /// Content matches its done marker
    Complete,
}

impl EntryState {
    /// Whether readers may use the entry
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Content of a lock sentinel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelRecord {
    /// Process holding the lock
    pub owner: OwnerId,
    /// Distinguishes handles held by the same process
    pub lock_id: Uuid,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
}

impl SentinelRecord {
    /// Record for a new lock held by the calling process
    pub fn new() -> Self {
        Self {
            owner: OwnerId::current(),
            lock_id: Uuid::new_v4(),
            acquired_at: Utc::now(),
        }
    }
}

impl Default for SentinelRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Content of a done marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneRecord {
    /// When the entry was completed
    pub completed_at: DateTime<Utc>,
    /// Content size at completion
    pub size: u64,
    /// SHA256 of the content at completion (hex)
    pub sha256: String,
}

impl DoneRecord {
    /// Describe `content` as completed now
    pub fn for_content(content: &[u8]) -> Self {
        Self {
            completed_at: Utc::now(),
            size: content.len() as u64,
            sha256: digest(content),
        }
    }

    /// Whether `content` is what was completed
    pub fn matches(&self, content: &[u8]) -> bool {
        self.size == content.len() as u64 && self.sha256 == digest(content)
    }
}

fn digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Sentinel path for an entry
pub fn sentinel_path(entry: &Path) -> PathBuf {
    with_suffix(entry, LOCK_SUFFIX)
}

/// Done marker path for an entry
pub fn done_path(entry: &Path) -> PathBuf {
    with_suffix(entry, DONE_SUFFIX)
}

/// Guard file reclaimers of `sentinel` take an advisory lock on
pub fn reclaim_guard_path(sentinel: &Path) -> PathBuf {
    with_suffix(sentinel, RECLAIM_SUFFIX)
}

/// Directory holding `path`; temp files are staged there
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn staged(path: &Path, content: &[u8]) -> io::Result<tempfile::NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent_dir(path))?;
    tmp.write_all(content)?;
    tmp.as_file().sync_data()?;
    Ok(tmp)
}

/// Replace `path` with `content` in one rename
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    staged(path, content)?
        .persist(path)
        .map(|_| ())
        .map_err(|e| e.error)
}

/// Create `path` holding `content` unless it already exists.
///
/// Returns `Ok(false)` when another file is already there. Relies on
/// no-clobber link semantics, which network filesystems honour only on a
/// best-effort basis.
pub fn create_exclusive(path: &Path, content: &[u8]) -> io::Result<bool> {
    match staged(path, content)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Time since `path` was last modified
pub fn age(path: &Path) -> io::Result<Duration> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

/// Read the done marker for an entry.
///
/// A missing or unparseable marker both mean "not done".
pub fn read_done(entry: &Path) -> CacheResult<Option<DoneRecord>> {
    let path = done_path(entry);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io("reading done marker", &path, e)),
    };
    match serde_json::from_slice(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Ignoring unreadable done marker");
            Ok(None)
        }
    }
}

/// Record the current content of an entry as complete
pub fn write_done(entry: &Path) -> CacheResult<DoneRecord> {
    let content = fs::read(entry).map_err(|e| CacheError::io("reading entry", entry, e))?;
    let record = DoneRecord::for_content(&content);
    let path = done_path(entry);
    write_atomic(&path, &serde_json::to_vec(&record)?)
        .map_err(|e| CacheError::io("writing done marker", &path, e))?;
    Ok(record)
}

/// Classify an entry without taking its lock
pub fn entry_state(entry: &Path) -> CacheResult<EntryState> {
    let content = match fs::read(entry) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(EntryState::Missing),
        Err(e) => return Err(CacheError::io("reading entry", entry, e)),
    };
    match read_done(entry)? {
        Some(done) if done.matches(&content) => Ok(EntryState::Complete),
        _ => Ok(EntryState::Building),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn marker_paths_are_colocated() {
        let entry = Path::new("/cache/k1/kernel.bc");
        assert_eq!(sentinel_path(entry), PathBuf::from("/cache/k1/kernel.bc.lock"));
        assert_eq!(done_path(entry), PathBuf::from("/cache/k1/kernel.bc.done"));

        assert_eq!(
            reclaim_guard_path(&sentinel_path(entry)),
            PathBuf::from("/cache/k1/kernel.bc.lock.reclaim")
        );
    }

    #[test]
    fn create_exclusive_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.lock");

        assert!(create_exclusive(&path, b"first").unwrap());
        assert!(!create_exclusive(&path, b"second").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("entry")]);
    }

    #[test]
    fn entry_state_transitions() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("entry");

        assert_eq!(entry_state(&entry).unwrap(), EntryState::Missing);

        fs::write(&entry, b"ABC").unwrap();
        assert_eq!(entry_state(&entry).unwrap(), EntryState::Building);

        write_done(&entry).unwrap();
        assert_eq!(entry_state(&entry).unwrap(), EntryState::Complete);

        // Changed behind the marker's back
        fs::write(&entry, b"ABD").unwrap();
        assert_eq!(entry_state(&entry).unwrap(), EntryState::Building);
        assert!(read_done(&entry).unwrap().is_some());
    }

    #[test]
    fn corrupt_done_marker_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("entry");
        fs::write(done_path(&entry), b"{not json").unwrap();

        assert!(read_done(&entry).unwrap().is_none());
    }

    #[test]
    fn remove_if_present_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone");
        fs::write(&path, b"x").unwrap();

        assert!(remove_if_present(&path).unwrap());
        assert!(!remove_if_present(&path).unwrap());
    }
}
