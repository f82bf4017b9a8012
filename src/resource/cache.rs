use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::{sync::OnceCell, time::Instant};

use super::{ResourceError, ResourceKind, ResourceQuery, envelope::RawCollection};

/// Default idle retention of a cached collection.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Result shared by every waiter on one descriptor.
pub type FetchOutcome = Result<Arc<RawCollection>, ResourceError>;

struct CacheEntry {
    cell: Arc<OnceCell<FetchOutcome>>,
    touched: Instant,
}

/// QueryCache
///
/// Per-tab query cache keyed by descriptor. Identical descriptors issued while one is
/// in flight share a single fetch and all receive its result. Successful results are
/// retained until invalidated or idle for longer than the retention window; failures
/// are never retained, so a retry always reaches the network.
pub struct QueryCache {
    entries: Mutex<HashMap<ResourceQuery, CacheEntry>>,
    retention: Duration,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl QueryCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// get_or_fetch
    ///
    /// Returns the cached outcome for `query`, joins an in-flight fetch for it, or
    /// runs `fetch` as the single fetch for it.
    ///
    /// 1. Garbage Collection: entries idle past the retention window are dropped.
    /// 2. Entry Lookup: the descriptor's cell is created or touched under the lock.
    /// 3. Single Flight: the first caller runs `fetch`, later callers await its cell.
    /// 4. Failure Eviction: an error is returned to every waiter, then forgotten.
    pub async fn get_or_fetch<F, Fut>(&self, query: &ResourceQuery, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        // 1. Garbage Collection
        self.collect_garbage();

        // 2. Entry Lookup
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = entries.entry(query.clone()).or_insert_with(|| CacheEntry {
                cell: Arc::new(OnceCell::new()),
                touched: Instant::now(),
            });
            entry.touched = Instant::now();
            entry.cell.clone()
        };

        // 3. Single Flight
        let outcome = cell.get_or_init(fetch).await.clone();

        // 4. Failure Eviction
        if outcome.is_err() {
            self.evict(query, &cell);
        }
        outcome
    }

    /// Drops the entry for `query`; the next request refetches.
    pub fn invalidate(&self, query: &ResourceQuery) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(query);
    }

    /// Drops every entry of `kind`.
    pub fn invalidate_kind(&self, kind: ResourceKind) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|query, _| query.kind != kind);
    }

    /// Evicts settled entries idle for longer than the retention window. In-flight
    /// entries are kept so their waiters still share one fetch.
    pub fn collect_garbage(&self) {
        let retention = self.retention;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, entry| !entry.cell.initialized() || entry.touched.elapsed() <= retention);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, query: &ResourceQuery, cell: &Arc<OnceCell<FetchOutcome>>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries
            .get(query)
            .is_some_and(|entry| Arc::ptr_eq(&entry.cell, cell))
        {
            entries.remove(query);
        }
    }
}
