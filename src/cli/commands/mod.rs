//! CLI command implementations
//!
//! The cache core is synchronous; commands run it on the blocking pool so
//! a spinner can tick while a contended lock is awaited.

pub mod config;
pub mod entry;
pub mod status;
pub mod tree;

pub use config::execute as config;
pub use entry::{cat, put, rm, touch};
pub use status::execute as status;
pub use tree::{evict, init};

use crate::cache::{AcquireMode, EntryStore, Locker};
use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::ui::{UiContext, WaitSpinner};
use std::path::{Path, PathBuf};

/// Shared state for cache commands
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub store: EntryStore,
    pub root: PathBuf,
    pub ui: UiContext,
}

impl CommandContext {
    /// Build from loaded configuration, with an optional root override
    pub fn new(config: &Config, root: Option<PathBuf>) -> Self {
        Self {
            store: EntryStore::new(Locker::new(config.lock.clone())),
            root: root.unwrap_or_else(|| config.cache.root.clone()),
            ui: UiContext::detect(),
        }
    }

    /// Resolve a user-supplied path against the cache root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Run blocking cache work off the async runtime, with a spinner while
    /// it may be waiting on a lock
    pub async fn blocking<T, F>(&self, message: &str, work: F) -> CacheResult<T>
    where
        F: FnOnce(EntryStore) -> CacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let spinner = WaitSpinner::start(&self.ui, message);
        let result = tokio::task::spawn_blocking(move || work(store))
            .await
            .map_err(|e| CacheError::Internal(format!("cache worker failed: {}", e)))?;
        spinner.finish();
        result
    }
}

/// Acquisition mode for a `--no-wait` flag
pub(crate) fn mode(no_wait: bool) -> AcquireMode {
    if no_wait {
        AcquireMode::Immediate
    } else {
        AcquireMode::Blocking
    }
}
