//! Shared on-disk cache of compiled artifacts
//!
//! Lets independent compiler processes populate and consume one cache
//! directory without corrupting entries, duplicating work, or hanging on a
//! participant that crashed mid-write. Coordination happens entirely
//! through files next to each entry.
//!
//! # Entry Lifecycle
//!
//! | State | On disk | Readers |
//! |-------|---------|---------|
//! | Missing | nothing | miss |
//! | Building | content, no valid `.done` | miss, recompute |
//! | Complete | content + matching `.done` | hit |
//!
//! A writer takes the entry's lock, writes, and releases with
//! `mark_done = true`. A writer that dies leaves a `.lock` whose owner is
//! no longer alive; the next acquirer reclaims it.
//!
//! ```rust,no_run
//! use cachelock::cache::{create_tree, AcquireMode, EntryStore};
//!
//! # fn main() -> cachelock::CacheResult<()> {
//! create_tree("/var/cache/kernels/k1")?;
//! let store = EntryStore::default();
//! let (lock, existed) = store
//!     .locker()
//!     .acquire_and_check_exists("/var/cache/kernels/k1/entry", AcquireMode::Blocking)?;
//! if !existed {
//!     store.write_entry(&lock, b"compiled", false, true)?;
//! }
//! lock.release(!existed)?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod lock;
pub mod marker;
pub mod owner;
pub mod tree;

pub use entry::{EntryData, EntryRef, EntryStore, Json, Serializable, WriteOutcome};
pub use lock::{AcquireMode, CacheLock, LockStatus, Locker};
pub use marker::{DoneRecord, EntryState, SentinelRecord};
pub use owner::{Liveness, OwnerId};
pub use tree::{create_tree, exists, file_size, remove_tree};
