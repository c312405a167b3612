//! Tiered cache manager
//!
//! Reads go tier 1 → tier 2 → (optionally) tier 3, backfilling faster tiers
//! on a slower-tier hit. Writes are asymmetric: the tier-1 write happens
//! before `set` returns and is what makes `set` succeed; tier-2/3 writes run
//! in a spawned task whose outcome is observable only through the returned
//! [`WriteReceipt`] and the logs.
//!
//! Every tier-2/3 call is bounded by a timeout. A failure or timeout counts
//! as a miss and never reaches the caller.

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    invalidation::{InvalidationEvent, InvalidationReason},
    memory::{MemoryLookup, MemoryTier},
    types::{CacheKey, CacheStats, CacheTier, CacheValue},
};
use crate::durable::DurableStore;
use crate::error::{Result, StoreError};
use crate::vector::{Embedder, Metadata, MetadataFilter, VectorIndex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Metadata `kind` of tier-3 cache vectors
pub const CACHE_VECTOR_KIND: &str = "cache";

/// Neighbours examined per tier-3 lookup
const TIER3_CANDIDATES: usize = 3;

/// Options for [`TieredCache::get`]
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Fall through to the similarity tier on a tier-2 miss
    pub allow_similarity_search: bool,

    /// Text to embed for the similarity query; the key itself when absent
    pub similarity_text: Option<String>,

    /// Only accept similarity hits whose value carries this schema
    pub schema: Option<String>,
}

impl GetOptions {
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn similar(text: impl Into<String>) -> Self {
        Self {
            allow_similarity_search: true,
            similarity_text: Some(text.into()),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Options for [`TieredCache::set`]
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Also index the entry in the similarity tier
    pub is_vector_eligible: bool,

    /// Tags for selective invalidation
    pub tags: Vec<String>,

    /// Text to embed for the similarity tier; the key itself when absent
    pub similarity_text: Option<String>,
}

impl SetOptions {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Mark vector-eligible, embedding `text` for similarity lookups
    pub fn vector_eligible(mut self, text: impl Into<String>) -> Self {
        self.is_vector_eligible = true;
        self.similarity_text = Some(text.into());
        self
    }
}

/// Outcome of one background tier write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Tier not configured, or the entry was not eligible for it
    Skipped,
    Failed(String),
    TimedOut,
}

/// Outcomes of the tier-2 and tier-3 writes of one `set`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub tier2: WriteOutcome,
    pub tier3: WriteOutcome,
}

impl WriteReport {
    fn skipped() -> Self {
        Self {
            tier2: WriteOutcome::Skipped,
            tier3: WriteOutcome::Skipped,
        }
    }
}

/// Handle returned by `set`.
///
/// Tier 1 is already written. Dropping the receipt does not cancel the
/// background tier-2/3 writes.
#[derive(Debug)]
pub struct WriteReceipt {
    evicted: Vec<CacheKey>,
    handle: Option<JoinHandle<WriteReport>>,
}

impl WriteReceipt {
    /// Keys evicted from tier 1 to make room for this write
    pub fn evicted(&self) -> &[CacheKey] {
        &self.evicted
    }

    /// Wait for the background writes to finish
    pub async fn settled(self) -> WriteReport {
        match self.handle {
            Some(handle) => handle.await.unwrap_or_else(|e| WriteReport {
                tier2: WriteOutcome::Failed(e.to_string()),
                tier3: WriteOutcome::Failed(e.to_string()),
            }),
            None => WriteReport::skipped(),
        }
    }
}

#[derive(Default)]
struct Counters {
    tier1_hits: AtomicU64,
    tier2_hits: AtomicU64,
    tier3_hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    corrupt_purged: AtomicU64,
    tier2_errors: AtomicU64,
    tier2_timeouts: AtomicU64,
    tier3_errors: AtomicU64,
    tier3_timeouts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn failure(&self, tier: CacheTier) {
        match tier {
            CacheTier::Vector => Self::bump(&self.tier3_errors),
            _ => Self::bump(&self.tier2_errors),
        }
    }

    fn timeout(&self, tier: CacheTier) {
        match tier {
            CacheTier::Vector => Self::bump(&self.tier3_timeouts),
            _ => Self::bump(&self.tier2_timeouts),
        }
    }
}

enum Attempt<T> {
    Done(T),
    Failed(String),
    TimedOut,
}

impl<T> From<Attempt<T>> for WriteOutcome {
    fn from(attempt: Attempt<T>) -> Self {
        match attempt {
            Attempt::Done(_) => WriteOutcome::Written,
            Attempt::Failed(e) => WriteOutcome::Failed(e),
            Attempt::TimedOut => WriteOutcome::TimedOut,
        }
    }
}

/// Run one tier-2/3 call under `budget`, absorbing failures into counters and logs
async fn bounded<T>(
    counters: &Counters,
    budget: Duration,
    tier: CacheTier,
    operation: &str,
    call: impl Future<Output = Result<T>>,
) -> Attempt<T> {
    match tokio::time::timeout(budget, call).await {
        Ok(Ok(value)) => Attempt::Done(value),
        Ok(Err(e)) => {
            warn!("{} {} failed: {}", tier, operation, e);
            counters.failure(tier);
            Attempt::Failed(e.to_string())
        }
        Err(_) => {
            let e = StoreError::Timeout {
                budget,
                operation: format!("{} {}", tier, operation),
            };
            warn!("{}", e);
            counters.timeout(tier);
            Attempt::TimedOut
        }
    }
}

#[derive(Clone)]
struct VectorTier {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

/// Three-tier cache: in-process LRU, durable key-value store, similarity index.
///
/// Construct once at start-up and share through an `Arc`.
pub struct TieredCache {
    config: CacheConfig,
    tier1: MemoryTier,
    durable: Option<Arc<dyn DurableStore>>,
    vector: Option<VectorTier>,
    counters: Arc<Counters>,

    /// Keys written by this process, per tag; lets tag invalidation reach tiers 2/3
    tag_index: Mutex<HashMap<String, HashSet<CacheKey>>>,
}

impl TieredCache {
    /// Create a tier-1-only cache; attach slower tiers with the `with_*` methods
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing tiered cache (tier1 capacity {}, default ttl {:?})",
            config.tier1_max_entries, config.default_ttl
        );

        Ok(Self {
            tier1: MemoryTier::new(config.tier1_max_entries),
            config,
            durable: None,
            vector: None,
            counters: Arc::new(Counters::default()),
            tag_index: Mutex::new(HashMap::new()),
        })
    }

    /// Attach a durable store as tier 2
    pub fn with_durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        info!("Tier 2 attached: {}", store.name());
        self.durable = Some(store);
        self
    }

    /// Attach a vector index and embedder as tier 3
    pub fn with_vector(mut self, index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        info!("Tier 3 attached: {} index, {} embedder", index.name(), embedder.name());
        self.vector = Some(VectorTier { index, embedder });
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look a key up across tiers
    pub async fn get(&self, key: &str, options: &GetOptions) -> Option<CacheValue> {
        match self.tier1.get(key).await {
            MemoryLookup::Hit(value) => {
                Counters::bump(&self.counters.tier1_hits);
                debug!("Cache hit (tier1): {}", key);
                return Some(value);
            }
            MemoryLookup::Expired => Counters::bump(&self.counters.expirations),
            MemoryLookup::Miss => {}
        }

        if let Some(store) = &self.durable {
            if let Some(entry) = self.get_tier2(store, key).await {
                Counters::bump(&self.counters.tier2_hits);
                debug!("Cache hit (tier2): {}", key);
                let value = entry.value.clone();
                self.backfill_tier1(entry).await;
                return Some(value);
            }
        }

        if options.allow_similarity_search {
            if let Some(vector) = &self.vector {
                let text = options.similarity_text.as_deref().unwrap_or(key);
                let schema = options.schema.as_deref();
                if let Some(found) = self.get_tier3(vector, text, schema).await {
                    Counters::bump(&self.counters.tier3_hits);
                    debug!("Cache hit (tier3): {} matched {}", key, found.key);
                    return Some(self.backfill_from_similar(key, found).await);
                }
            }
        }

        Counters::bump(&self.counters.misses);
        debug!("Cache miss: {}", key);
        None
    }

    /// Look a key up and decode it under `schema`.
    ///
    /// A value that fails to decode is corrupt: it is invalidated everywhere
    /// and reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
        schema: &str,
        options: &GetOptions,
    ) -> Option<T> {
        let scoped;
        let options = if options.allow_similarity_search && options.schema.is_none() {
            scoped = options.clone().with_schema(schema);
            &scoped
        } else {
            options
        };

        let value = self.get(key, options).await?;
        match value.decode(schema) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Purging undecodable cache value {}: {}", key, e);
                Counters::bump(&self.counters.corrupt_purged);
                self.remove_everywhere(key).await;
                None
            }
        }
    }

    /// Write a value. Tier 1 is written before this returns.
    pub async fn set(
        &self,
        key: impl Into<CacheKey>,
        value: CacheValue,
        ttl: Duration,
        options: SetOptions,
    ) -> WriteReceipt {
        let key = key.into();
        let entry = CacheEntry::new(key.clone(), value, ttl).with_tags(options.tags.iter().cloned());

        let evicted = self.tier1.insert(entry.clone()).await;
        self.index_tags(&entry).await;
        debug!("Cache set: {} (ttl {:?})", key, ttl);

        let vector = if options.is_vector_eligible {
            self.vector.clone()
        } else {
            None
        };
        if self.durable.is_none() && vector.is_none() {
            return WriteReceipt {
                evicted,
                handle: None,
            };
        }

        let job = BackgroundWrite {
            durable: self.durable.clone(),
            vector,
            counters: self.counters.clone(),
            tier2_timeout: self.config.tier2_timeout,
            tier3_timeout: self.config.tier3_timeout,
            tier3_ttl: self.config.tier3_ttl,
            similarity_text: options.similarity_text.unwrap_or_else(|| key.clone()),
            entry,
        };

        WriteReceipt {
            evicted,
            handle: Some(tokio::spawn(job.run())),
        }
    }

    /// Write a value with the default TTL (jittered)
    pub async fn set_default(
        &self,
        key: impl Into<CacheKey>,
        value: CacheValue,
        options: SetOptions,
    ) -> WriteReceipt {
        let ttl = self.config.ttl_with_jitter();
        self.set(key, value, ttl, options).await
    }

    /// Encode `value` as JSON under `schema` and write it
    pub async fn set_json<T: Serialize>(
        &self,
        key: impl Into<CacheKey>,
        schema: &str,
        value: &T,
        ttl: Duration,
        options: SetOptions,
    ) -> Result<WriteReceipt> {
        let value = CacheValue::json(schema, value)?;
        Ok(self.set(key, value, ttl, options).await)
    }

    /// Remove a key from every tier (best-effort below tier 1).
    /// Returns whether tier 1 held it.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.remove_everywhere(key).await;
        Counters::bump(&self.counters.invalidations);
        debug!("Invalidated {} (tier1 held it: {})", key, removed);
        removed
    }

    /// Remove every entry carrying `tag` from every tier (best-effort below tier 1)
    pub async fn invalidate_by_tag(&self, tag: &str) -> InvalidationEvent {
        let mut keys: HashSet<CacheKey> = self.tier1.remove_by_tag(tag).await.into_iter().collect();
        if let Some(indexed) = self.tag_index.lock().await.remove(tag) {
            keys.extend(indexed);
        }

        for key in &keys {
            self.remove_everywhere(key).await;
        }

        let event = InvalidationEvent::new(
            InvalidationReason::Tag {
                tag: tag.to_string(),
            },
            keys.into_iter().collect(),
        );
        self.counters
            .invalidations
            .fetch_add(event.count() as u64, Ordering::Relaxed);
        info!("Invalidated {}", event);
        event
    }

    /// Sweep expired entries out of tier 1
    pub async fn cleanup_expired(&self) -> InvalidationEvent {
        let event = InvalidationEvent::new(InvalidationReason::Expired, self.tier1.cleanup_expired().await);
        self.counters
            .expirations
            .fetch_add(event.count() as u64, Ordering::Relaxed);
        event
    }

    /// Whether tier 1 holds a live entry for `key`
    pub async fn contains(&self, key: &str) -> bool {
        self.tier1.contains(key).await
    }

    /// Number of tier-1 entries
    pub async fn len(&self) -> usize {
        self.tier1.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.tier1.is_empty().await
    }

    /// Drop every tier-1 entry; slower tiers are untouched
    pub async fn clear(&self) -> usize {
        let count = self.tier1.clear().await;
        info!("Cleared {} entries from tier 1", count);
        count
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let evictions = self.tier1.evictions().await;
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        CacheStats {
            tier1_hits: load(&c.tier1_hits),
            tier2_hits: load(&c.tier2_hits),
            tier3_hits: load(&c.tier3_hits),
            misses: load(&c.misses),
            tier1_size: self.tier1.len().await,
            tier1_capacity: self.tier1.capacity(),
            evictions,
            expirations: load(&c.expirations),
            invalidations: load(&c.invalidations),
            corrupt_purged: load(&c.corrupt_purged),
            tier2_errors: load(&c.tier2_errors),
            tier2_timeouts: load(&c.tier2_timeouts),
            tier3_errors: load(&c.tier3_errors),
            tier3_timeouts: load(&c.tier3_timeouts),
        }
    }

    async fn call<T>(
        &self,
        tier: CacheTier,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Attempt<T> {
        let budget = match tier {
            CacheTier::Vector => self.config.tier3_timeout,
            _ => self.config.tier2_timeout,
        };
        bounded(&self.counters, budget, tier, operation, call).await
    }

    async fn get_tier2(&self, store: &Arc<dyn DurableStore>, key: &str) -> Option<CacheEntry> {
        let mut attempt = self.call(CacheTier::Durable, "get", store.get(key)).await;
        if matches!(attempt, Attempt::TimedOut) && self.config.tier2_retry_on_timeout {
            debug!("Retrying tier2 get once after timeout: {}", key);
            attempt = self.call(CacheTier::Durable, "get", store.get(key)).await;
        }

        let bytes = match attempt {
            Attempt::Done(Some(bytes)) => bytes,
            _ => return None,
        };

        match decode_envelope(key, &bytes) {
            Ok(entry) if entry.is_expired() => {
                debug!("Tier2 entry expired: {}", key);
                Counters::bump(&self.counters.expirations);
                self.call(CacheTier::Durable, "delete", store.delete(key)).await;
                None
            }
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Purging corrupt tier2 entry {}: {}", key, e);
                Counters::bump(&self.counters.corrupt_purged);
                self.call(CacheTier::Durable, "delete", store.delete(key)).await;
                None
            }
        }
    }

    async fn get_tier3(
        &self,
        vector: &VectorTier,
        text: &str,
        schema: Option<&str>,
    ) -> Option<CacheEntry> {
        let embedding = match self.call(CacheTier::Vector, "embed", vector.embedder.embed(text)).await {
            Attempt::Done(embedding) => embedding,
            _ => return None,
        };

        let mut filter = MetadataFilter::new().eq("kind", CACHE_VECTOR_KIND);
        if let Some(schema) = schema {
            filter = filter.eq("schema", schema);
        }
        let hits = match self
            .call(
                CacheTier::Vector,
                "query",
                vector.index.query(&embedding, TIER3_CANDIDATES, Some(&filter)),
            )
            .await
        {
            Attempt::Done(hits) => hits,
            _ => return None,
        };

        for hit in hits {
            if f64::from(hit.score) < self.config.similarity_threshold {
                debug!("Tier3 best candidate below threshold ({:.3})", hit.score);
                break;
            }

            let decoded = hit
                .metadata
                .get("entry")
                .ok_or_else(|| StoreError::Serialization("missing entry metadata".to_string()))
                .and_then(|raw| Ok(serde_json::from_str::<CacheEntry>(raw)?));

            match decoded {
                Ok(entry) if entry.is_expired() => {
                    debug!("Sweeping expired tier3 entry: {}", hit.id);
                    Counters::bump(&self.counters.expirations);
                    self.call(CacheTier::Vector, "delete", vector.index.delete(&hit.id)).await;
                }
                Ok(entry) => return Some(entry),
                Err(e) => {
                    warn!("Purging corrupt tier3 entry {}: {}", hit.id, e);
                    Counters::bump(&self.counters.corrupt_purged);
                    self.call(CacheTier::Vector, "delete", vector.index.delete(&hit.id)).await;
                }
            }
        }

        None
    }

    async fn backfill_tier1(&self, mut entry: CacheEntry) {
        entry.last_accessed_at = chrono::Utc::now();
        self.index_tags(&entry).await;
        self.tier1.insert(entry).await;
    }

    /// Promote a tier-3 hit under the requested key into tiers 1 and 2
    async fn backfill_from_similar(&self, key: &str, found: CacheEntry) -> CacheValue {
        let remaining = found.time_until_expiration().unwrap_or(Duration::ZERO);
        let entry = CacheEntry::new(key.to_string(), found.value.clone(), remaining)
            .with_tags(found.tags.iter().cloned());

        self.backfill_tier1(entry.clone()).await;

        if let Some(store) = self.durable.clone() {
            let counters = self.counters.clone();
            let budget = self.config.tier2_timeout;
            tokio::spawn(async move {
                if let Ok(bytes) = serde_json::to_vec(&entry) {
                    bounded(
                        &counters,
                        budget,
                        CacheTier::Durable,
                        "backfill put",
                        store.put(&entry.key, bytes, remaining),
                    )
                    .await;
                }
            });
        }

        found.value
    }

    async fn remove_everywhere(&self, key: &str) -> bool {
        let removed = self.tier1.remove(key).await.is_some();

        if let Some(store) = &self.durable {
            self.call(CacheTier::Durable, "delete", store.delete(key)).await;
        }
        if let Some(vector) = &self.vector {
            self.call(CacheTier::Vector, "delete", vector.index.delete(key)).await;
        }

        let mut tag_index = self.tag_index.lock().await;
        for keys in tag_index.values_mut() {
            keys.remove(key);
        }
        tag_index.retain(|_, keys| !keys.is_empty());

        removed
    }

    async fn index_tags(&self, entry: &CacheEntry) {
        if entry.tags.is_empty() {
            return;
        }
        let mut tag_index = self.tag_index.lock().await;
        for tag in &entry.tags {
            tag_index
                .entry(tag.clone())
                .or_default()
                .insert(entry.key.clone());
        }
    }
}

fn decode_envelope(key: &str, bytes: &[u8]) -> Result<CacheEntry> {
    let entry: CacheEntry = serde_json::from_slice(bytes)?;
    if entry.key != key {
        return Err(StoreError::Serialization(format!(
            "envelope key {} does not match {}",
            entry.key, key
        )));
    }
    Ok(entry)
}

/// Tier-2/3 writes dispatched by `set`
struct BackgroundWrite {
    durable: Option<Arc<dyn DurableStore>>,
    vector: Option<VectorTier>,
    counters: Arc<Counters>,
    tier2_timeout: Duration,
    tier3_timeout: Duration,
    tier3_ttl: Duration,
    similarity_text: String,
    entry: CacheEntry,
}

impl BackgroundWrite {
    async fn run(self) -> WriteReport {
        let tier2 = match &self.durable {
            Some(store) => self.write_tier2(store.as_ref()).await,
            None => WriteOutcome::Skipped,
        };
        let tier3 = match &self.vector {
            Some(vector) => self.write_tier3(vector).await,
            None => WriteOutcome::Skipped,
        };

        WriteReport { tier2, tier3 }
    }

    async fn write_tier2(&self, store: &dyn DurableStore) -> WriteOutcome {
        let bytes = match serde_json::to_vec(&self.entry) {
            Ok(bytes) => bytes,
            Err(e) => return WriteOutcome::Failed(e.to_string()),
        };

        bounded(
            &self.counters,
            self.tier2_timeout,
            CacheTier::Durable,
            "put",
            store.put(&self.entry.key, bytes, self.entry.ttl),
        )
        .await
        .into()
    }

    async fn write_tier3(&self, vector: &VectorTier) -> WriteOutcome {
        let mut entry = self.entry.clone();
        entry.ttl = entry.ttl.min(self.tier3_ttl);

        let serialized = match serde_json::to_string(&entry) {
            Ok(serialized) => serialized,
            Err(e) => return WriteOutcome::Failed(e.to_string()),
        };

        let embedding = match bounded(
            &self.counters,
            self.tier3_timeout,
            CacheTier::Vector,
            "embed",
            vector.embedder.embed(&self.similarity_text),
        )
        .await
        {
            Attempt::Done(embedding) => embedding,
            other => return other.into(),
        };

        let mut metadata = Metadata::new();
        metadata.insert("kind".to_string(), CACHE_VECTOR_KIND.to_string());
        metadata.insert("key".to_string(), entry.key.clone());
        metadata.insert("schema".to_string(), entry.value.schema.clone());
        metadata.insert("entry".to_string(), serialized);

        bounded(
            &self.counters,
            self.tier3_timeout,
            CacheTier::Vector,
            "upsert",
            vector.index.upsert(&entry.key, embedding, metadata),
        )
        .await
        .into()
    }
}

/// Background task for automatic tier-1 cleanup
pub async fn start_auto_cleanup(cache: Arc<TieredCache>) {
    let interval = cache.config.cleanup_interval;

    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let event = cache.cleanup_expired().await;
        if !event.is_empty() {
            debug!("Auto cleanup: {}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::MemoryDurableStore;

    fn config() -> CacheConfig {
        CacheConfig::ephemeral()
    }

    #[tokio::test]
    async fn test_tier1_only_round_trip() {
        let cache = TieredCache::new(config()).unwrap();

        let receipt = cache
            .set("q1", CacheValue::text("answer-1"), Duration::from_secs(60), SetOptions::default())
            .await;
        assert_eq!(receipt.settled().await, WriteReport::skipped());

        let value = cache.get("q1", &GetOptions::exact()).await;
        assert_eq!(value, Some(CacheValue::text("answer-1")));
        assert_eq!(cache.stats().await.tier1_hits, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = CacheConfig::builder().tier1_max_entries(0).build();
        assert!(TieredCache::new(config).is_err());
    }

    #[tokio::test]
    async fn test_get_json_purges_schema_mismatch() {
        let store = Arc::new(MemoryDurableStore::new());
        let cache = TieredCache::new(config()).unwrap().with_durable(store.clone());

        cache
            .set_json("k", "retrieval/v1", &vec![1, 2, 3], Duration::from_secs(60), SetOptions::default())
            .await
            .unwrap()
            .settled()
            .await;

        let wrong: Option<Vec<i32>> = cache.get_json("k", "answer/v1", &GetOptions::exact()).await;
        assert!(wrong.is_none());
        assert!(!cache.contains("k").await);
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(cache.stats().await.corrupt_purged, 1);
    }

    #[test]
    fn test_decode_envelope_rejects_other_key() {
        let entry = CacheEntry::new("a".to_string(), CacheValue::text("v"), Duration::from_secs(1));
        let bytes = serde_json::to_vec(&entry).unwrap();

        assert!(decode_envelope("a", &bytes).is_ok());
        assert!(decode_envelope("b", &bytes).is_err());
        assert!(decode_envelope("a", b"{").is_err());
    }
}
