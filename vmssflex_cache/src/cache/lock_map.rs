//! Advisory mutual exclusion keyed by arbitrary strings.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Grants exclusive access to a logical key (a scale set id, a well-known
/// lookup key) for multi-step sequences spanning several caches.
///
/// Distinct keys never contend. Callers must hold at most one guard at a time.
#[derive(Default)]
pub struct LockMap {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held lock on one key; released on drop.
pub struct EntryGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl EntryGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl LockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Waits until `key` is free and locks it.
    pub async fn lock_entry(&self, key: &str) -> EntryGuard {
        let guard = self.mutex(key).lock_owned().await;
        EntryGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Locks `key` only if nobody holds it.
    pub fn try_lock_entry(&self, key: &str) -> Option<EntryGuard> {
        let guard = self.mutex(key).try_lock_owned().ok()?;
        Some(EntryGuard {
            key: key.to_string(),
            _guard: guard,
        })
    }

    pub fn unlock_entry(&self, guard: EntryGuard) {
        drop(guard);
    }
}
