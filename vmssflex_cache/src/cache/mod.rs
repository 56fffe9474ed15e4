//! Generic caching primitives: a concurrent entry store, a TTL cache with
//! single-flight refreshes on top of it, and per-key advisory locks.

pub mod entry_store;
pub mod lock_map;
pub mod timed;

pub use entry_store::{CacheEntry, EntryStore};
pub use lock_map::{EntryGuard, LockMap};
pub use timed::{ReadPolicy, Refresh, TimedCache};
