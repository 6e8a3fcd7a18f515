//! Error types for cachelock
//!
//! All modules use `CacheResult<T>` as their return type.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for cachelock operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in cachelock
#[derive(Error, Debug)]
pub enum CacheError {
    // Filesystem outcomes
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    // Lock errors
    #[error("Cache entry is locked by another owner: {path}")]
    Busy { path: PathBuf },

    #[error("Timed out after {waited:?} waiting for lock on {path}")]
    Timeout { path: PathBuf, waited: Duration },

    // Content errors
    #[error("Failed to serialize entry {path}: {reason}")]
    Serialize { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Classify an IO error against the path it concerns.
    ///
    /// `NotFound`, `AlreadyExists` and `PermissionDenied` get their own
    /// variants so callers can match on them; everything else is wrapped
    /// with context.
    pub fn io(context: impl Into<String>, path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                context: format!("{} {}", context.into(), path.display()),
                source,
            },
        }
    }

    /// Whether the error means "nothing there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if error is retryable
    ///
    /// Lock contention is always recoverable: retry, wait longer, or
    /// recompute the artifact without caching.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Timeout { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Busy { .. } => Some("Another process holds the lock. Retry without --no-wait"),
            Self::Timeout { .. } => Some("Raise lock.timeout_ms, or run: cachelock status <entry>"),
            Self::PermissionDenied(_) => Some("Check ownership of the cache directory"),
            Self::ConfigInvalid { .. } => Some("Run: cachelock config init --force"),
            _ => None,
        }
    }
}
