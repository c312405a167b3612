//! Cache entry management with TTL support

use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// A cache entry with TTL and access bookkeeping.
///
/// An entry is readable only while `now - created_at <= ttl`. Past that point
/// it is logically expired and must not be served, whether or not it has been
/// physically removed yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached value
    pub value: CacheValue,

    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// Time-to-live measured from `created_at`
    #[serde(rename = "ttl_seconds", with = "duration_secs")]
    pub ttl: Duration,

    /// Number of reads served by this entry
    pub hit_count: u64,

    /// Last access time (for LRU tracking)
    pub last_accessed_at: DateTime<Utc>,

    /// Tags for selective invalidation
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: CacheKey, value: CacheValue, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            key,
            value,
            created_at: now,
            ttl,
            hit_count: 0,
            last_accessed_at: now,
            tags: BTreeSet::new(),
        }
    }

    /// Attach tags to the entry
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Absolute expiration instant
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero())
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        (self.expires_at() - Utc::now()).to_std().ok()
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.last_accessed_at = Utc::now();
        self.hit_count += 1;
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Check if entry has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(ttl.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry::new("test".to_string(), CacheValue::text("value"), ttl)
    }

    #[test]
    fn test_cache_entry_creation() {
        let entry = entry(Duration::from_secs(3600));

        assert_eq!(entry.key, "test");
        assert_eq!(entry.value.as_text(), Some("value"));
        assert_eq!(entry.hit_count, 0);
        assert!(!entry.is_expired());
        assert_eq!(entry.created_at, entry.last_accessed_at);
    }

    #[test]
    fn test_entry_expiration() {
        let entry = entry(Duration::from_millis(100));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(150));
        assert!(entry.is_expired());
        assert!(entry.time_until_expiration().is_none());
    }

    #[test]
    fn test_expired_at_boundary() {
        let entry = entry(Duration::from_secs(10));
        let boundary = entry.expires_at();

        assert!(!entry.is_expired_at(boundary));
        assert!(entry.is_expired_at(boundary + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn test_mark_accessed() {
        let mut entry = entry(Duration::from_secs(3600));
        let initial_time = entry.last_accessed_at;

        sleep(Duration::from_millis(10));
        entry.mark_accessed();

        assert_eq!(entry.hit_count, 1);
        assert!(entry.last_accessed_at > initial_time);
    }

    #[test]
    fn test_tags() {
        let entry = entry(Duration::from_secs(3600)).with_tags(["corpus", "answer", "corpus"]);

        assert_eq!(entry.tags.len(), 2);
        assert!(entry.has_tag("corpus"));
        assert!(!entry.has_tag("nonexistent"));
    }

    #[test]
    fn test_serde_ttl_in_seconds() {
        let entry = entry(Duration::from_millis(1500));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["ttl_seconds"], serde_json::json!(1.5));

        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.ttl, Duration::from_millis(1500));
        assert_eq!(back, entry);
    }

    #[test]
    fn test_age() {
        let entry = entry(Duration::from_secs(3600));
        sleep(Duration::from_millis(10));
        assert!(entry.age() >= Duration::from_millis(10));
    }
}
