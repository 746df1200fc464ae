use std::time::Duration;

use moka::policy::EvictionPolicy;
use tokio::time::Instant;

use super::CacheKey;

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
pub(super) struct CacheEntry<T> {
    /// The successfully produced value.
    pub value: T,
    /// When the value was stored.
    pub stored_at: Instant,
    /// How long after `stored_at` the value is considered stale.
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// An entry is fresh strictly before its ttl has elapsed.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// The store of successfully produced values.
///
/// Staleness is checked lazily on reads: a stale entry reads as absent and is evicted by that read.
/// Apart from that, moka only evicts entries to stay within the configured capacity, always the
/// least recently used ones, so that a value that was just produced is never rejected in favor of
/// stale entries.
pub(super) struct CacheStore<T> {
    cache: moka::sync::Cache<CacheKey, CacheEntry<T>>,
}

impl<T: Clone + Send + Sync + 'static> CacheStore<T> {
    pub fn new(name: &str, capacity: u64) -> Self {
        let cache = moka::sync::Cache::builder()
            .name(name)
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache }
    }

    /// Returns the value for `key` if there is a fresh entry, evicting a stale one.
    ///
    /// Callers must hold the in-flight table lock, so that the eviction can not race with a
    /// concurrent store for the same key.
    pub fn get_fresh(&self, key: &str) -> Option<T> {
        let entry = self.cache.get(key)?;
        if entry.is_fresh(Instant::now()) {
            return Some(entry.value);
        }

        tracing::trace!(%key, age = ?entry.stored_at.elapsed(), "Evicting stale entry");
        self.cache.invalidate(key);
        None
    }

    pub fn insert(&self, key: CacheKey, entry: CacheEntry<T>) {
        self.cache.insert(key, entry);
    }

    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// The number of stored entries, including stale ones that were not read yet.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: &str) -> CacheKey {
        CacheKey::new(key).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_and_stale() {
        let store = CacheStore::new("test", 16);
        store.insert(key("users"), CacheEntry::new(1, Duration::from_secs(5)));

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert_eq!(store.get_fresh("users"), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get_fresh("users"), None);
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_evicted_lazily() {
        let store = CacheStore::new("test", 16);
        store.insert(key("a"), CacheEntry::new(1, Duration::from_secs(1)));
        store.insert(key("b"), CacheEntry::new(2, Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.entry_count(), 2);

        assert_eq!(store.get_fresh("a"), None);
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_keeps_newest_entry() {
        let store = CacheStore::new("test", 2);
        store.insert(key("a"), CacheEntry::new(1, Duration::from_secs(1)));
        store.insert(key("b"), CacheEntry::new(2, Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(2)).await;
        store.insert(key("c"), CacheEntry::new(3, Duration::from_secs(60)));

        assert_eq!(store.entry_count(), 2);
        assert_eq!(store.get_fresh("c"), Some(3));
        assert_eq!(store.get_fresh("a"), None);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let store = CacheStore::new("test", 2);
        store.insert(key("a"), CacheEntry::new(1, Duration::from_secs(60)));
        store.insert(key("b"), CacheEntry::new(2, Duration::from_secs(60)));
        assert_eq!(store.get_fresh("a"), Some(1));
        store.entry_count();

        store.insert(key("c"), CacheEntry::new(3, Duration::from_secs(60)));

        assert_eq!(store.entry_count(), 2);
        assert_eq!(store.get_fresh("c"), Some(3));
        assert_eq!(store.get_fresh("a"), Some(1));
        assert_eq!(store.get_fresh("b"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_never_fresh() {
        let store = CacheStore::new("test", 16);
        store.insert(key("a"), CacheEntry::new(1, Duration::ZERO));
        assert_eq!(store.get_fresh("a"), None);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let store = CacheStore::new("test", 16);
        store.invalidate("missing");

        store.insert(key("a"), CacheEntry::new(1, Duration::from_secs(60)));
        store.insert(key("b"), CacheEntry::new(2, Duration::from_secs(60)));
        store.invalidate("a");
        assert_eq!(store.get_fresh("a"), None);
        assert_eq!(store.get_fresh("b"), Some(2));

        store.clear();
        assert_eq!(store.get_fresh("b"), None);
    }
}
