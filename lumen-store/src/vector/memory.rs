//! In-process vector index (brute-force cosine)

use super::{cosine_similarity, Metadata, MetadataFilter, VectorIndex, VectorMatch};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Exact nearest-neighbour search over an in-memory map.
///
/// All vectors must share the dimensionality of the first one inserted.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    vectors: RwLock<HashMap<String, (Vec<f32>, Metadata)>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every vector whose metadata passes `filter`, returning the count
    pub async fn delete_where(&self, filter: &MetadataFilter) -> usize {
        let mut vectors = self.vectors.write().await;
        let before = vectors.len();
        vectors.retain(|_, (_, metadata)| !filter.matches(metadata));
        before - vectors.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, id: &str, embedding: Vec<f32>, metadata: Metadata) -> Result<()> {
        let mut vectors = self.vectors.write().await;

        if let Some((existing, _)) = vectors.values().next() {
            if existing.len() != embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: existing.len(),
                    actual: embedding.len(),
                });
            }
        }

        vectors.insert(id.to_string(), (embedding, metadata));
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let vectors = self.vectors.read().await;

        let mut matches: Vec<VectorMatch> = vectors
            .iter()
            .filter(|(_, (_, metadata))| filter.map(|f| f.matches(metadata)).unwrap_or(true))
            .map(|(id, (vector, metadata))| {
                if vector.len() != embedding.len() {
                    return Err(StoreError::DimensionMismatch {
                        expected: vector.len(),
                        actual: embedding.len(),
                    });
                }
                Ok(VectorMatch {
                    id: id.clone(),
                    score: cosine_similarity(embedding, vector),
                    metadata: metadata.clone(),
                })
            })
            .collect::<Result<_>>()?;

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.vectors.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(kind: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("kind".to_string(), kind.to_string());
        m
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index.upsert("a", vec![1.0, 0.0], meta("doc")).await.unwrap();
        index.upsert("b", vec![0.7, 0.7], meta("doc")).await.unwrap();
        index.upsert("c", vec![0.0, 1.0], meta("doc")).await.unwrap();

        let hits = index.query(&[1.0, 0.1], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
    }

    #[tokio::test]
    async fn test_filter_and_delete() {
        let index = InMemoryVectorIndex::new();
        index.upsert("doc", vec![1.0, 0.0], meta("doc")).await.unwrap();
        index.upsert("hit", vec![1.0, 0.0], meta("cache")).await.unwrap();

        let filter = MetadataFilter::new().eq("kind", "cache");
        let hits = index.query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "hit");

        index.delete("hit").await.unwrap();
        assert!(index.query(&[1.0, 0.0], 10, Some(&filter)).await.unwrap().is_empty());

        assert_eq!(index.delete_where(&MetadataFilter::new().eq("kind", "doc")).await, 1);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let index = InMemoryVectorIndex::new();
        index.upsert("a", vec![1.0, 0.0], Metadata::new()).await.unwrap();

        let err = index.upsert("b", vec![1.0], Metadata::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(index.query(&[1.0, 0.0, 0.0], 1, None).await.is_err());
    }
}
