//! Query fingerprints and namespaced cache keys

use crate::cache::types::CacheKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 32;

/// Normalize a query for fingerprinting.
///
/// Trims, lowercases, drops punctuation (word characters, including CJK, and
/// whitespace survive) and collapses whitespace runs to a single space.
pub fn normalize_query(query: &str) -> String {
    let stripped: String = query
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable fingerprint of a query: hex prefix of SHA-256 over the normalized form
pub fn fingerprint(query: &str) -> String {
    let digest = Sha256::digest(normalize_query(query).as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Key namespace, so answers and retrieval results never collide
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    /// Fully synthesized answer
    Answer,

    /// Ranked retrieval context
    Retrieval,

    Custom(String),
}

impl std::fmt::Display for KeyNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyNamespace::Answer => write!(f, "answer"),
            KeyNamespace::Retrieval => write!(f, "retrieval"),
            KeyNamespace::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// Cache key builder: `<namespace>:<identifier>?k=v&...`
pub struct CacheKeyBuilder {
    namespace: KeyNamespace,
    identifier: String,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    /// Create a new cache key builder
    pub fn new(namespace: KeyNamespace) -> Self {
        Self {
            namespace,
            identifier: String::new(),
            params: Vec::new(),
        }
    }

    /// Set the primary identifier
    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = id.into();
        self
    }

    /// Use the fingerprint of `query` as the identifier
    pub fn query(self, query: &str) -> Self {
        self.identifier(fingerprint(query))
    }

    /// Add a parameter to the key
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Build the cache key
    pub fn build(self) -> CacheKey {
        let mut key = format!("{}:{}", self.namespace, self.identifier);

        if !self.params.is_empty() {
            let params_str: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&params_str.join("&"));
        }

        key
    }

    /// `answer:<fp>`
    pub fn answer(query: &str) -> CacheKey {
        Self::new(KeyNamespace::Answer).query(query).build()
    }

    /// `retrieval:<fp>?k=<top_k>`
    pub fn retrieval(query: &str, top_k: usize) -> CacheKey {
        Self::new(KeyNamespace::Retrieval)
            .query(query)
            .param("k", top_k)
            .build()
    }
}
