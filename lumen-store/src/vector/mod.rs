//! Vector index and embedder interfaces (tier 3 and vector retrieval)

mod embedder;
mod memory;

pub use embedder::{is_cjk, HashingEmbedder};
pub use memory::InMemoryVectorIndex;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String metadata stored alongside a vector
pub type Metadata = HashMap<String, String>;

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,

    /// Cosine similarity in `[-1, 1]`
    pub score: f32,

    pub metadata: Metadata,
}

/// Equality filter over metadata: every pair must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    equals: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).map(|m| m == v).unwrap_or(false))
    }
}

/// Nearest-neighbour index service.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace a vector
    async fn upsert(&self, id: &str, embedding: Vec<f32>, metadata: Metadata) -> Result<()>;

    /// Top-`top_k` neighbours by descending similarity that pass `filter`
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete a vector; deleting a missing id is not an error
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Text embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Output dimensionality
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_metadata_filter() {
        let mut metadata = Metadata::new();
        metadata.insert("kind".to_string(), "cache".to_string());

        assert!(MetadataFilter::new().matches(&metadata));
        assert!(MetadataFilter::new().eq("kind", "cache").matches(&metadata));
        assert!(!MetadataFilter::new().eq("kind", "document").matches(&metadata));
        assert!(!MetadataFilter::new().eq("missing", "x").matches(&metadata));
    }
}
