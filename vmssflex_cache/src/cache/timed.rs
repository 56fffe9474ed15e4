//! TTL cache with per-key single-flight refreshes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::entry_store::EntryStore;
use crate::error::CacheError;

/// Produces the payload of one cache key from the remote side.
pub trait Refresh: Send + Sync {
    type Output: Send + Sync + 'static;

    fn refresh(&self, key: &str) -> impl Future<Output = Result<Self::Output, CacheError>> + Send;
}

/// How a read treats cached data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Cached data younger than the TTL, otherwise refresh.
    #[default]
    Default,
    /// Always refresh, unless a refresh completed while waiting for the entry.
    ForceRefresh,
    /// Whatever is cached, even mid-refresh or expired. Never refreshes.
    Unsafe,
    /// Whatever is cached once any in-flight refresh finished. Never refreshes.
    NoRefresh,
}

/// Cache of refreshable snapshots keyed by string.
///
/// Refreshes of one key never overlap: callers arriving while a refresh is in
/// flight wait for it and share its result, errors included. A failed refresh
/// leaves the stored snapshot as it was, except for [`CacheError::NotFound`]
/// which drops the entry since the scope no longer exists. An entry whose first
/// refresh fails is not kept either.
pub struct TimedCache<R: Refresh> {
    store: EntryStore<R::Output>,
    refresher: R,
    ttl: Duration,
    disabled: bool,
}

impl<R: Refresh> TimedCache<R> {
    /// With `disabled` every read calls the refresher and nothing is stored.
    pub fn new(refresher: R, ttl: Duration, disabled: bool) -> Self {
        Self {
            store: EntryStore::new(),
            refresher,
            ttl,
            disabled,
        }
    }

    pub fn store(&self) -> &EntryStore<R::Output> {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub async fn get(&self, key: &str, policy: ReadPolicy) -> Result<Arc<R::Output>, CacheError> {
        if self.disabled {
            return self.refresher.refresh(key).await.map(Arc::new);
        }
        match policy {
            ReadPolicy::Unsafe => self
                .store
                .get_by_key(key)
                .and_then(|entry| entry.data())
                .ok_or(CacheError::NotFound),
            ReadPolicy::NoRefresh => {
                let entry = self.store.get_by_key(key).ok_or(CacheError::NotFound)?;
                let _guard = entry.lock.lock().await;
                entry.data().ok_or(CacheError::NotFound)
            }
            ReadPolicy::Default | ReadPolicy::ForceRefresh => {
                self.get_or_refresh(key, policy).await
            }
        }
    }

    async fn get_or_refresh(
        &self,
        key: &str,
        policy: ReadPolicy,
    ) -> Result<Arc<R::Output>, CacheError> {
        let entry = self.store.get_or_insert(key);
        let seen_generation = entry.generation();
        let _guard = entry.lock.lock().await;

        let snapshot = entry.snapshot();
        if let Some(snapshot) = &snapshot {
            if policy == ReadPolicy::Default && snapshot.last_update.elapsed() < self.ttl {
                return Ok(Arc::clone(&snapshot.data));
            }
        }
        // an attempt finished while we waited: its outcome is ours too
        if entry.generation() != seen_generation {
            if let Some(err) = entry.failure() {
                return Err(err);
            }
            if let Some(snapshot) = snapshot {
                return Ok(snapshot.data);
            }
        }

        match self.refresher.refresh(key).await {
            Ok(data) => {
                let data = Arc::new(data);
                entry.store(Arc::clone(&data), Instant::now());
                entry.bump_generation();
                Ok(data)
            }
            Err(err) => {
                if err.is_not_found() {
                    tracing::debug!("{} no longer exists, dropping its cache entry", key);
                    entry.clear();
                }
                if entry.snapshot().is_none() {
                    self.store.remove_entry(key, &entry);
                }
                entry.record_failure(err.clone());
                Err(err)
            }
        }
    }

    /// Replaces the payload of `key` without calling the refresher.
    pub async fn update(&self, key: &str, data: R::Output) {
        if self.disabled {
            return;
        }
        let entry = self.store.get_or_insert(key);
        let _guard = entry.lock.lock().await;
        entry.store(Arc::new(data), Instant::now());
    }

    /// Derives a new payload from the cached one under the entry lock.
    ///
    /// The entry keeps its original age. Returns `false` when nothing is cached.
    pub async fn update_with<F>(&self, key: &str, f: F) -> bool
    where
        F: FnOnce(&R::Output) -> R::Output,
    {
        if self.disabled {
            return false;
        }
        let Some(entry) = self.store.get_by_key(key) else {
            return false;
        };
        let _guard = entry.lock.lock().await;
        let Some(snapshot) = entry.snapshot() else {
            return false;
        };
        entry.store(Arc::new(f(&snapshot.data)), snapshot.last_update);
        true
    }

    /// Drops the entry for `key` once any refresh in flight for it finished.
    ///
    /// Callers still waiting on the entry get [`CacheError::NotFound`].
    pub async fn delete(&self, key: &str) {
        let Some(entry) = self.store.get_by_key(key) else {
            return;
        };
        let _guard = entry.lock.lock().await;
        entry.clear();
        self.store.remove_entry(key, &entry);
        entry.record_failure(CacheError::NotFound);
    }

    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }
}
