//! Core type definitions for the cache system

use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - exact string, normally a namespaced query fingerprint
pub type CacheKey = String;

/// Schema tag for UTF-8 text values
pub const TEXT_SCHEMA: &str = "text/plain";

/// A cached value: opaque bytes plus the schema tag they were encoded under.
///
/// The tag is checked on decode so a value written by one component is never
/// silently read as another component's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValue {
    /// Schema tag, e.g. `"answer/v1"`
    pub schema: String,

    /// Encoded payload
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

impl CacheValue {
    pub fn new(schema: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            schema: schema.into(),
            bytes,
        }
    }

    /// Wrap a plain string
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(TEXT_SCHEMA, value.into().into_bytes())
    }

    /// Encode a serializable value as JSON under `schema`
    pub fn json<T: Serialize>(schema: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(schema, serde_json::to_vec(value)?))
    }

    /// Decode a JSON value, rejecting a different schema tag
    pub fn decode<T: DeserializeOwned>(&self, expected_schema: &str) -> Result<T> {
        if self.schema != expected_schema {
            return Err(StoreError::SchemaMismatch {
                expected: expected_schema.to_string(),
                found: self.schema.clone(),
            });
        }
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    /// Borrow the payload as text when it is tagged and encoded as such
    pub fn as_text(&self) -> Option<&str> {
        if self.schema == TEXT_SCHEMA {
            std::str::from_utf8(&self.bytes).ok()
        } else {
            None
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Cache tier, ordered from lowest to highest latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Tier 1: in-process map, process-lifetime only
    Memory,

    /// Tier 2: external durable key-value store
    Durable,

    /// Tier 3: vector-indexed similarity cache
    Vector,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "tier1"),
            CacheTier::Durable => write!(f, "tier2"),
            CacheTier::Vector => write!(f, "tier3"),
        }
    }
}

/// Statistics snapshot for cache performance monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Hits served from tier 1
    pub tier1_hits: u64,

    /// Hits served from tier 2
    pub tier2_hits: u64,

    /// Hits served from tier 3
    pub tier3_hits: u64,

    /// Lookups no tier could serve
    pub misses: u64,

    /// Entries currently held in tier 1
    pub tier1_size: usize,

    /// Configured tier-1 capacity
    pub tier1_capacity: usize,

    /// Tier-1 LRU evictions
    pub evictions: u64,

    /// Entries dropped because their TTL elapsed
    pub expirations: u64,

    /// Entries removed by explicit invalidation
    pub invalidations: u64,

    /// Entries deleted because they failed to decode
    pub corrupt_purged: u64,

    /// Tier-2 call failures (absorbed)
    pub tier2_errors: u64,

    /// Tier-2 call timeouts (absorbed)
    pub tier2_timeouts: u64,

    /// Tier-3 call failures (absorbed)
    pub tier3_errors: u64,

    /// Tier-3 call timeouts (absorbed)
    pub tier3_timeouts: u64,
}

impl CacheStats {
    /// Hits across all tiers
    pub fn hits(&self) -> u64 {
        self.tier1_hits + self.tier2_hits + self.tier3_hits
    }

    /// Hits for a single tier
    pub fn hits_for(&self, tier: CacheTier) -> u64 {
        match tier {
            CacheTier::Memory => self.tier1_hits,
            CacheTier::Durable => self.tier2_hits,
            CacheTier::Vector => self.tier3_hits,
        }
    }

    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}/{}/{}, misses: {}, hit_rate: {:.2}%, tier1: {}/{} }}",
            self.tier1_hits,
            self.tier2_hits,
            self.tier3_hits,
            self.misses,
            self.hit_rate(),
            self.tier1_size,
            self.tier1_capacity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            tier1_hits: 50,
            tier2_hits: 20,
            tier3_hits: 10,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hits(), 80);
        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.hits_for(CacheTier::Durable), 20);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            tier1_hits: 100,
            misses: 50,
            tier1_size: 75,
            tier1_capacity: 100,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100/0/0"));
        assert!(display.contains("misses: 50"));
        assert!(display.contains("tier1: 75/100"));
    }

    #[test]
    fn test_cache_tier_display() {
        assert_eq!(format!("{}", CacheTier::Memory), "tier1");
        assert_eq!(format!("{}", CacheTier::Durable), "tier2");
        assert_eq!(format!("{}", CacheTier::Vector), "tier3");
    }

    #[test]
    fn test_value_schema_checked_on_decode() {
        let value = CacheValue::json("answer/v1", &vec!["a", "b"]).unwrap();
        let decoded: Vec<String> = value.decode("answer/v1").unwrap();
        assert_eq!(decoded, vec!["a", "b"]);

        let err = value.decode::<Vec<String>>("retrieval/v1").unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_text_value() {
        let value = CacheValue::text("answer-1");
        assert_eq!(value.as_text(), Some("answer-1"));
        assert_eq!(value.len(), 8);

        let other = CacheValue::new("application/octet-stream", vec![0xff, 0x00]);
        assert_eq!(other.as_text(), None);
    }

    #[test]
    fn test_value_serde_hex_payload() {
        let value = CacheValue::new("bin", vec![0xde, 0xad]);
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"dead\""));
        let back: CacheValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
