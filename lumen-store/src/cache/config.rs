//! Configuration for the tiered cache

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the tiered cache
///
/// - Tier 1 is bounded by entry count and evicts least recently accessed first
/// - Tier 2/3 calls are bounded by their own timeouts; a timeout is a miss
/// - Jitter spreads expirations of entries populated in bulk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default time-to-live for entries written with `set_default`
    pub default_ttl: Duration,

    /// Maximum number of entries held in tier 1
    pub tier1_max_entries: usize,

    /// TTL jitter factor (0.0 - 1.0)
    pub ttl_jitter: f64,

    /// Time budget for a single tier-2 call
    pub tier2_timeout: Duration,

    /// Time budget for a single tier-3 call (embed + query counted separately)
    pub tier3_timeout: Duration,

    /// Retry a tier-2 read once when it times out
    pub tier2_retry_on_timeout: bool,

    /// Minimum cosine similarity for a tier-3 hit (0.0 - 1.0)
    pub similarity_threshold: f64,

    /// Lifetime of tier-3 entries, independent of the caller's TTL
    pub tier3_ttl: Duration,

    /// Enable the periodic tier-1 sweep of expired entries
    pub enable_auto_cleanup: bool,

    /// Interval for automatic cleanup checks
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            tier1_max_entries: 100,
            ttl_jitter: 0.125,
            tier2_timeout: Duration::from_millis(250),
            tier3_timeout: Duration::from_millis(500),
            tier2_retry_on_timeout: true,
            similarity_threshold: 0.90,
            tier3_ttl: Duration::from_secs(7 * 24 * 3600),
            enable_auto_cleanup: true,
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tier1_max_entries == 0 {
            return Err(StoreError::Config(
                "tier1_max_entries must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(StoreError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(StoreError::Config(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.tier2_timeout.is_zero() || self.tier3_timeout.is_zero() {
            return Err(StoreError::Config(
                "tier timeouts must be greater than 0".to_string(),
            ));
        }

        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err(StoreError::Config(
                "cleanup_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.default_ttl;
        }

        let base_secs = self.default_ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }

    /// Short budgets, no jitter, no background sweep. Suited to tests and
    /// single-shot CLI runs.
    pub fn ephemeral() -> Self {
        Self {
            default_ttl: Duration::from_secs(600),
            tier1_max_entries: 32,
            ttl_jitter: 0.0,
            tier2_timeout: Duration::from_millis(100),
            tier3_timeout: Duration::from_millis(100),
            enable_auto_cleanup: false,
            ..Default::default()
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    tier1_max_entries: Option<usize>,
    ttl_jitter: Option<f64>,
    tier2_timeout: Option<Duration>,
    tier3_timeout: Option<Duration>,
    tier2_retry_on_timeout: Option<bool>,
    similarity_threshold: Option<f64>,
    tier3_ttl: Option<Duration>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set tier-1 capacity
    pub fn tier1_max_entries(mut self, max: usize) -> Self {
        self.tier1_max_entries = Some(max);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn tier2_timeout(mut self, timeout: Duration) -> Self {
        self.tier2_timeout = Some(timeout);
        self
    }

    pub fn tier3_timeout(mut self, timeout: Duration) -> Self {
        self.tier3_timeout = Some(timeout);
        self
    }

    pub fn tier2_retry_on_timeout(mut self, retry: bool) -> Self {
        self.tier2_retry_on_timeout = Some(retry);
        self
    }

    /// Set tier-3 similarity threshold
    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn tier3_ttl(mut self, ttl: Duration) -> Self {
        self.tier3_ttl = Some(ttl);
        self
    }

    /// Enable or disable automatic cleanup
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Set cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            tier1_max_entries: self.tier1_max_entries.unwrap_or(defaults.tier1_max_entries),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            tier2_timeout: self.tier2_timeout.unwrap_or(defaults.tier2_timeout),
            tier3_timeout: self.tier3_timeout.unwrap_or(defaults.tier3_timeout),
            tier2_retry_on_timeout: self
                .tier2_retry_on_timeout
                .unwrap_or(defaults.tier2_retry_on_timeout),
            similarity_threshold: self
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            tier3_ttl: self.tier3_ttl.unwrap_or(defaults.tier3_ttl),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.tier1_max_entries, 100);
        assert_eq!(config.tier3_ttl, Duration::from_secs(604_800));
        assert!(config.tier2_retry_on_timeout);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid_config = CacheConfig::default();
        invalid_config.tier1_max_entries = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.ttl_jitter = 1.5;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.similarity_threshold = -0.1;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.tier2_timeout = Duration::ZERO;
        assert!(matches!(
            invalid_config.validate(),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .default_ttl(Duration::from_secs(600))
            .tier1_max_entries(5)
            .tier2_timeout(Duration::from_millis(50))
            .similarity_threshold(0.8)
            .build();

        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.tier1_max_entries, 5);
        assert_eq!(config.tier2_timeout, Duration::from_millis(50));
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.tier3_timeout, CacheConfig::default().tier3_timeout);
    }

    #[test]
    fn test_ttl_with_jitter() {
        let config = CacheConfig {
            default_ttl: Duration::from_secs(3600),
            ttl_jitter: 0.1,
            ..Default::default()
        };

        for _ in 0..20 {
            let ttl = config.ttl_with_jitter();
            assert!(ttl.as_secs_f64() >= 3240.0);
            assert!(ttl.as_secs_f64() <= 3960.0);
        }
    }

    #[test]
    fn test_ephemeral_has_no_jitter() {
        let config = CacheConfig::ephemeral();
        assert_eq!(config.ttl_with_jitter(), config.default_ttl);
        assert!(!config.enable_auto_cleanup);
        assert!(config.validate().is_ok());
    }
}
