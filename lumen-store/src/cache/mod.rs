//! # Tiered Cache
//!
//! Key/value cache over three backing tiers with different latency,
//! durability and capacity trade-offs.
//!
//! ## Tiers
//!
//! - **Tier 1**: in-process map, bounded by entry count, LRU eviction
//! - **Tier 2**: external durable key-value store, survives restarts
//! - **Tier 3**: vector-indexed cache, looked up by similarity rather than by
//!   exact key
//!
//! A hit in a slower tier is written back into the faster ones, so repeated
//! access converges toward tier-1 latency. Tier-2/3 failures and timeouts are
//! absorbed as misses.
//!
//! ## Example
//!
//! ```rust
//! use lumen_store::cache::{CacheConfig, CacheValue, GetOptions, SetOptions, TieredCache};
//! use lumen_store::durable::MemoryDurableStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> lumen_store::Result<()> {
//! let cache = TieredCache::new(CacheConfig::default())?
//!     .with_durable(Arc::new(MemoryDurableStore::new()));
//!
//! cache
//!     .set("q1", CacheValue::text("answer-1"), Duration::from_secs(3600), SetOptions::default())
//!     .await;
//!
//! if let Some(value) = cache.get("q1", &GetOptions::exact()).await {
//!     println!("Cache hit: {:?}", value.as_text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod invalidation;
pub mod key;
pub mod memory;
pub mod tiered;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use key::{fingerprint, normalize_query, CacheKeyBuilder, KeyNamespace};
pub use tiered::{
    start_auto_cleanup, GetOptions, SetOptions, TieredCache, WriteOutcome, WriteReceipt,
    WriteReport,
};
pub use types::{CacheKey, CacheStats, CacheTier, CacheValue, TEXT_SCHEMA};
