//! Application configuration
//!
//! Loaded from an optional YAML file; every section has defaults so an empty
//! or missing file is valid. A handful of environment variables override the
//! file (see [`AppConfig::apply_env_overrides`]).

use anyhow::{Context, Result};
use lumen_store::cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub retrieval: RetrievalSettings,
    pub streaming: StreamingSettings,
    pub router: RouterSettings,
    pub generation: GenerationSettings,
    pub corpus: CorpusSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub tier1_max_entries: usize,
    pub default_ttl_secs: u64,
    pub ttl_jitter: f64,
    pub tier2_timeout_ms: u64,
    pub tier3_timeout_ms: u64,
    pub tier2_retry_on_timeout: bool,
    pub similarity_threshold: f64,
    pub tier3_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Directory of the file-backed durable tier; in-process store when unset
    pub durable_dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            tier1_max_entries: defaults.tier1_max_entries,
            default_ttl_secs: defaults.default_ttl.as_secs(),
            ttl_jitter: defaults.ttl_jitter,
            tier2_timeout_ms: defaults.tier2_timeout.as_millis() as u64,
            tier3_timeout_ms: defaults.tier3_timeout.as_millis() as u64,
            tier2_retry_on_timeout: defaults.tier2_retry_on_timeout,
            similarity_threshold: defaults.similarity_threshold,
            tier3_ttl_secs: defaults.tier3_ttl.as_secs(),
            cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
            durable_dir: None,
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .tier1_max_entries(self.tier1_max_entries)
            .default_ttl(Duration::from_secs(self.default_ttl_secs))
            .ttl_jitter(self.ttl_jitter)
            .tier2_timeout(Duration::from_millis(self.tier2_timeout_ms))
            .tier3_timeout(Duration::from_millis(self.tier3_timeout_ms))
            .tier2_retry_on_timeout(self.tier2_retry_on_timeout)
            .similarity_threshold(self.similarity_threshold)
            .tier3_ttl(Duration::from_secs(self.tier3_ttl_secs))
            .cleanup_interval(Duration::from_secs(self.cleanup_interval_secs))
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub vector_timeout_ms: u64,
    /// Pattern strategy drops documents below this score
    pub pattern_min_score: f32,
    /// Pattern strategy returns at most this many documents
    pub pattern_limit: usize,
    /// TTL of memoized retrieval results
    pub memo_ttl_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 8,
            vector_timeout_ms: 500,
            pattern_min_score: 0.3,
            pattern_limit: 5,
            memo_ttl_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Pause after each thinking chunk; zero disables it
    pub thinking_delay_ms: u64,
    pub sources_limit: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            thinking_delay_ms: 250,
            sources_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Queries at or below this many characters may skip retrieval
    pub short_query_chars: usize,
    /// Queries above this many characters are always complex
    pub long_query_chars: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            short_query_chars: 12,
            long_query_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// OpenAI-compatible base URL; the offline extractive backend is used when unset
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub simple_model: String,
    pub medium_model: String,
    pub complex_model: String,
    pub fallback_models: Vec<String>,
    /// Embeddings model; the hashing embedder is used when unset
    pub embedding_model: Option<String>,
    pub embedding_dimensions: usize,
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Recent conversation messages forwarded with the prompt
    pub history_messages: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            simple_model: "gpt-4o-mini".to_string(),
            medium_model: "gpt-4o-mini".to_string(),
            complex_model: "gpt-4o".to_string(),
            fallback_models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            embedding_model: None,
            embedding_dimensions: 1536,
            request_timeout_secs: 60,
            max_tokens: 2048,
            temperature: 0.3,
            top_p: 0.9,
            history_messages: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    /// JSON corpus file; the built-in knowledge base is used when unset
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load from `path` (if given) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml(&raw).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// `LUMEN_HOST`, `LUMEN_PORT`, `LUMEN_CORPUS`, `LUMEN_CACHE_DIR`,
    /// `LUMEN_GENERATION_URL`, `OPENAI_API_KEY`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("LUMEN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LUMEN_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid LUMEN_PORT: {}", port),
            }
        }
        if let Some(path) = lookup("LUMEN_CORPUS") {
            self.corpus.path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("LUMEN_CACHE_DIR") {
            self.cache.durable_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup("LUMEN_GENERATION_URL") {
            self.generation.base_url = Some(url);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.generation.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.cache
            .to_cache_config()
            .validate()
            .context("Invalid cache section")?;
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be greater than 0");
        }
        if self.router.short_query_chars >= self.router.long_query_chars {
            anyhow::bail!("router.short_query_chars must be below router.long_query_chars");
        }
        info!(
            "Configuration loaded (top_k {}, tier1 capacity {})",
            self.retrieval.top_k, self.cache.tier1_max_entries
        );
        Ok(())
    }

    pub fn thinking_delay(&self) -> Duration {
        Duration::from_millis(self.streaming.thinking_delay_ms)
    }

    pub fn vector_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval.vector_timeout_ms)
    }
}
