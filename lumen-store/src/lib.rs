//! # lumen-store
//!
//! Caching and storage layer for the lumen knowledge assistant.
//!
//! ## Features
//!
//! - Three-tier cache (in-process LRU, durable key-value, similarity index)
//! - TTL expiry with jitter, tag invalidation and periodic sweeps
//! - Bounded timeouts on every external tier call; failures degrade to misses
//! - Storage interfaces with in-process and file-backed implementations
//!
//! ## Storage interfaces
//!
//! The cache talks to its slower tiers only through traits, so any product
//! satisfying the contract can be plugged in:
//!
//! - [`durable::DurableStore`]: `get` / `put` with TTL / `delete`
//! - [`vector::VectorIndex`]: `upsert` / `query` with filter / `delete`
//! - [`vector::Embedder`]: `embed(text) -> Vec<f32>`
//!
//! ```no_run
//! use lumen_store::cache::{CacheConfig, TieredCache};
//! use lumen_store::durable::FileDurableStore;
//! use lumen_store::vector::{HashingEmbedder, InMemoryVectorIndex};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let durable = FileDurableStore::open("/var/cache/lumen").await?;
//!     let cache = TieredCache::new(CacheConfig::default())?
//!         .with_durable(Arc::new(durable))
//!         .with_vector(
//!             Arc::new(InMemoryVectorIndex::new()),
//!             Arc::new(HashingEmbedder::default()),
//!         );
//!
//!     println!("{}", cache.stats().await);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod durable;
pub mod error;
pub mod vector;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheKeyBuilder, CacheStats, CacheTier,
    CacheValue, GetOptions, InvalidationEvent, InvalidationReason, SetOptions, TieredCache,
    WriteOutcome, WriteReceipt, WriteReport,
};
pub use durable::{DurableStore, FileDurableStore, MemoryDurableStore};
pub use error::{Result, StoreError};
pub use vector::{Embedder, HashingEmbedder, InMemoryVectorIndex, VectorIndex, VectorMatch};
