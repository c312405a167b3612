//! Invalidation records
//!
//! Bulk removals (tag invalidation, expiry sweeps) report what they removed
//! as an [`InvalidationEvent`]. Single-key invalidation only reports whether
//! tier 1 held the key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::CacheKey;

/// What triggered a bulk removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidationReason {
    /// Tier-1 sweep of entries past their TTL
    Expired,

    /// Every entry written with `tag`, across all tiers
    Tag { tag: String },
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "expiry sweep"),
            InvalidationReason::Tag { tag } => write!(f, "tag '{}'", tag),
        }
    }
}

/// Keys removed by one bulk invalidation, sorted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub reason: InvalidationReason,
    pub at: DateTime<Utc>,
    pub keys: Vec<CacheKey>,
}

impl InvalidationEvent {
    pub fn new(reason: InvalidationReason, mut keys: Vec<CacheKey>) -> Self {
        keys.sort();
        keys.dedup();
        Self {
            reason,
            at: Utc::now(),
            keys,
        }
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Display for InvalidationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} key(s) removed", self.reason, self.keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_sorted_and_unique() {
        let event = InvalidationEvent::new(
            InvalidationReason::Tag {
                tag: "corpus".to_string(),
            },
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
        );

        assert_eq!(event.keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(event.to_string(), "tag 'corpus': 2 key(s) removed");
    }

    #[test]
    fn test_reason_wire_shape() {
        let json = serde_json::to_value(InvalidationReason::Tag {
            tag: "corpus".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "tag");
        assert_eq!(json["tag"], "corpus");

        let empty = InvalidationEvent::new(InvalidationReason::Expired, Vec::new());
        assert!(empty.is_empty());
    }
}
