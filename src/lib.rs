//! cachelock - shared compiler artifact cache
//!
//! Filesystem-backed locking and atomic persistence that lets independent
//! compiler processes fill and read one on-disk cache of build artifacts.
//! See [`cache`] for the protocol.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod ui;

pub use cache::{AcquireMode, CacheLock, EntryStore, Locker};
pub use error::{CacheError, CacheResult};
