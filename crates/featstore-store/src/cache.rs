//! Bounded entry cache in front of the feature table.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use featstore_types::FeatureKey;

/// Cache of materialized feature versions.
///
/// Bounded by entry count and evicting entries that have not been read for
/// the idle timeout. Safe to share between threads without extra locking.
/// The store never relies on an entry still being present.
pub struct EntryCache<V: Send + Sync + 'static> {
    cache: Cache<FeatureKey, Arc<V>>,
}

impl<V: Send + Sync + 'static> EntryCache<V> {
    pub fn new(max_capacity: u64, idle_timeout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(idle_timeout)
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &FeatureKey) -> Option<Arc<V>> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: FeatureKey, value: Arc<V>) {
        self.cache.insert(key, value);
    }

    /// Drop the entry for one key.
    pub fn invalidate(&self, key: &FeatureKey) {
        self.cache.invalidate(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    pub fn contains(&self, key: &FeatureKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featstore_types::BigId;
    use time::macros::datetime;

    fn cache() -> EntryCache<String> {
        EntryCache::new(100, Duration::from_secs(60))
    }

    #[test]
    fn test_insert_get_invalidate() {
        let cache = cache();
        let key = FeatureKey::timeless(BigId::new(1, 1));
        cache.insert(key, Arc::new("v1".to_string()));
        assert_eq!(cache.get(&key).as_deref().map(String::as_str), Some("v1"));

        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_versions_are_separate_entries() {
        let cache = cache();
        let id = BigId::new(1, 1);
        let v1 = FeatureKey::new(id, datetime!(2024-01-01 0:00 UTC));
        let v2 = FeatureKey::new(id, datetime!(2024-02-01 0:00 UTC));
        cache.insert(v1, Arc::new("v1".to_string()));
        cache.insert(v2, Arc::new("v2".to_string()));
        cache.invalidate(&v1);
        assert!(cache.get(&v1).is_none());
        assert!(cache.get(&v2).is_some());
    }

    #[test]
    fn test_parent_does_not_change_lookup() {
        let cache = cache();
        let key = FeatureKey::timeless(BigId::new(1, 1));
        cache.insert(key.with_parent(BigId::new(1, 9)), Arc::new("child".to_string()));
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        for i in 1..=10 {
            cache.insert(FeatureKey::timeless(BigId::new(1, i)), Arc::new(i.to_string()));
        }
        assert_eq!(cache.entry_count(), 10);
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
    }
}
