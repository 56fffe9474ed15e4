//! Concurrent store of cache entries backed by `DashMap`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::CacheError;

/// Immutable payload plus the instant it was produced.
pub(crate) struct Snapshot<T> {
    pub(crate) data: Arc<T>,
    pub(crate) last_update: Instant,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            last_update: self.last_update,
        }
    }
}

/// One cached scope (e.g. "all scale sets" or "VMs of scale set X").
///
/// `lock` serializes refreshes and in-place updates of this entry. The
/// snapshot itself sits behind a short-lived `RwLock`, so readers that do
/// not need to wait for an in-flight refresh never block on `lock`.
pub struct CacheEntry<T> {
    key: String,
    pub(crate) lock: Mutex<()>,
    snapshot: RwLock<Option<Snapshot<T>>>,
    /// Error of the last refresh attempt, cleared when a payload is stored.
    failure: RwLock<Option<CacheError>>,
    /// Bumped whenever a refresh attempt completes, successfully or not.
    generation: AtomicU64,
}

impl<T> CacheEntry<T> {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            lock: Mutex::new(()),
            snapshot: RwLock::new(None),
            failure: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The current payload, if any has been stored.
    pub fn data(&self) -> Option<Arc<T>> {
        self.snapshot().map(|s| s.data)
    }

    /// When the current payload was stored.
    pub fn last_update(&self) -> Option<Instant> {
        self.snapshot().map(|s| s.last_update)
    }

    pub(crate) fn snapshot(&self) -> Option<Snapshot<T>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn store(&self, data: Arc<T>, last_update: Instant) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) =
            Some(Snapshot { data, last_update });
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub(crate) fn clear(&self) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Records a failed attempt so callers that waited on it can share the error.
    pub(crate) fn record_failure(&self, err: CacheError) {
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = Some(err);
        self.bump_generation();
    }

    pub(crate) fn failure(&self) -> Option<CacheError> {
        self.failure
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// Thread-safe map from key to cache entry.
///
/// The three primitives are individually atomic. Read-then-refresh sequences
/// are the job of [`super::TimedCache`].
pub struct EntryStore<T> {
    entries: DashMap<String, Arc<CacheEntry<T>>>,
}

impl<T> Default for EntryStore<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> EntryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Inserts or replaces the entry for `key`.
    pub fn set(&self, key: &str, entry: Arc<CacheEntry<T>>) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        self.entries.remove(key).map(|(_, e)| e)
    }

    /// Returns the entry for `key`, creating an empty one if absent.
    pub fn get_or_insert(&self, key: &str) -> Arc<CacheEntry<T>> {
        if let Some(entry) = self.get_by_key(key) {
            return entry;
        }
        Arc::clone(
            self.entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CacheEntry::new(key)))
                .value(),
        )
    }

    /// Removes `key` only while it still maps to `entry`.
    pub fn remove_entry(&self, key: &str, entry: &Arc<CacheEntry<T>>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
