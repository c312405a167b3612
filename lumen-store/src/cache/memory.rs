//! Tier 1: in-process LRU map with TTL

use crate::cache::{
    entry::CacheEntry,
    types::{CacheKey, CacheValue},
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of a tier-1 lookup
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryLookup {
    Hit(CacheValue),
    /// Present but past its TTL; the entry has been removed
    Expired,
    Miss,
}

/// Bounded in-process store.
///
/// The access-ordered queue front is always the least recently accessed key,
/// so eviction pops from the front. All mutation happens under one lock.
#[derive(Clone)]
pub struct MemoryTier {
    capacity: usize,
    store: Arc<RwLock<MemoryStore>>,
}

struct MemoryStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// LRU tracking: maintains access order
    lru_queue: VecDeque<CacheKey>,

    evictions: u64,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            store: Arc::new(RwLock::new(MemoryStore {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                evictions: 0,
            })),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a key, updating its access time on a hit
    pub async fn get(&self, key: &str) -> MemoryLookup {
        let mut store = self.store.write().await;

        let Some(entry) = store.entries.get_mut(key) else {
            return MemoryLookup::Miss;
        };

        if entry.is_expired() {
            debug!("Tier-1 entry expired: {}", key);
            store.remove_entry(key);
            return MemoryLookup::Expired;
        }

        entry.mark_accessed();
        let value = entry.value.clone();
        store.touch(key);

        MemoryLookup::Hit(value)
    }

    /// Insert or replace an entry, evicting least recently accessed entries
    /// to stay within capacity. Returns the evicted keys.
    pub async fn insert(&self, entry: CacheEntry) -> Vec<CacheKey> {
        let mut store = self.store.write().await;
        let key = entry.key.clone();

        if store.entries.contains_key(&key) {
            debug!("Updating existing tier-1 entry: {}", key);
            store.entries.insert(key.clone(), entry);
            store.touch(&key);
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while store.entries.len() >= self.capacity {
            match store.lru_queue.pop_front() {
                Some(victim) => {
                    debug!("Evicting tier-1 entry (capacity {}): {}", self.capacity, victim);
                    store.entries.remove(&victim);
                    store.evictions += 1;
                    evicted.push(victim);
                }
                None => break,
            }
        }

        store.entries.insert(key.clone(), entry);
        store.lru_queue.push_back(key);
        evicted
    }

    /// Remove a specific entry
    pub async fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut store = self.store.write().await;
        store.remove_entry(key)
    }

    /// Remove every entry carrying `tag`, returning the removed keys
    pub async fn remove_by_tag(&self, tag: &str) -> Vec<CacheKey> {
        let mut store = self.store.write().await;

        let keys: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.has_tag(tag))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            store.remove_entry(key);
        }
        keys
    }

    /// Remove all expired entries, returning their keys
    pub async fn cleanup_expired(&self) -> Vec<CacheKey> {
        let mut store = self.store.write().await;

        let expired: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove_entry(key);
        }
        expired
    }

    /// Whether a live entry exists (does not count as an access)
    pub async fn contains(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Snapshot of an entry without touching it
    pub async fn peek(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.read().await;
        store.entries.get(key).cloned()
    }

    /// Get number of entries (expired-but-unswept included)
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clear all entries, returning how many were dropped
    pub async fn clear(&self) -> usize {
        let mut store = self.store.write().await;
        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        count
    }

    /// LRU evictions since creation
    pub async fn evictions(&self) -> u64 {
        self.store.read().await.evictions
    }
}

impl MemoryStore {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        Some(entry)
    }

    /// Move `key` to the most-recently-used end
    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(key: &str, ttl: Duration) -> CacheEntry {
        CacheEntry::new(key.to_string(), CacheValue::text(format!("v-{key}")), ttl)
    }

    #[tokio::test]
    async fn test_basic_insert_and_get() {
        let tier = MemoryTier::new(10);
        tier.insert(entry("key1", Duration::from_secs(60))).await;

        assert_eq!(
            tier.get("key1").await,
            MemoryLookup::Hit(CacheValue::text("v-key1"))
        );
        assert_eq!(tier.get("missing").await, MemoryLookup::Miss);
        assert_eq!(tier.peek("key1").await.unwrap().hit_count, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let tier = MemoryTier::new(10);
        tier.insert(entry("key1", Duration::from_millis(50))).await;

        assert!(tier.contains("key1").await);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!tier.contains("key1").await);
        assert_eq!(tier.get("key1").await, MemoryLookup::Expired);
        assert_eq!(tier.len().await, 0);
        assert_eq!(tier.evictions().await, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_prefers_least_recently_accessed() {
        let tier = MemoryTier::new(3);
        for key in ["key1", "key2", "key3"] {
            tier.insert(entry(key, Duration::from_secs(60))).await;
        }

        // key1 becomes most recent, key2 is now the LRU victim
        assert!(matches!(tier.get("key1").await, MemoryLookup::Hit(_)));

        let evicted = tier.insert(entry("key4", Duration::from_secs(60))).await;
        assert_eq!(evicted, vec!["key2".to_string()]);
        assert_eq!(tier.len().await, 3);
        assert!(tier.contains("key1").await);
        assert!(!tier.contains("key2").await);
        assert_eq!(tier.evictions().await, 1);
    }

    #[tokio::test]
    async fn test_replace_does_not_evict() {
        let tier = MemoryTier::new(2);
        tier.insert(entry("a", Duration::from_secs(60))).await;
        tier.insert(entry("b", Duration::from_secs(60))).await;

        let evicted = tier.insert(entry("a", Duration::from_secs(60))).await;
        assert!(evicted.is_empty());
        assert_eq!(tier.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_by_tag_and_cleanup() {
        let tier = MemoryTier::new(10);
        tier.insert(entry("a", Duration::from_secs(60)).with_tags(["corpus"]))
            .await;
        tier.insert(entry("b", Duration::from_secs(60))).await;
        tier.insert(entry("c", Duration::from_millis(20))).await;

        assert_eq!(tier.remove_by_tag("corpus").await, vec!["a".to_string()]);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(tier.cleanup_expired().await, vec!["c".to_string()]);
        assert_eq!(tier.len().await, 1);

        assert_eq!(tier.clear().await, 1);
        assert!(tier.is_empty().await);
    }
}
