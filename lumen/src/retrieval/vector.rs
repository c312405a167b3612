//! Vector strategy: nearest-neighbour search over embedded documents

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lumen_store::vector::{Embedder, Metadata, MetadataFilter, VectorIndex};
use lumen_store::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{RetrievalMatch, Strategy};
use crate::corpus::Document;

/// Metadata `kind` of document vectors; cache vectors in a shared index use
/// a different kind
pub const DOCUMENT_VECTOR_KIND: &str = "document";

/// Vector ids are namespaced so documents never collide with cache keys
fn vector_id(document_id: &str) -> String {
    format!("doc:{}", document_id)
}

pub struct VectorStrategy {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    indexed: Mutex<HashSet<String>>,
}

impl VectorStrategy {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            indexed: Mutex::new(HashSet::new()),
        }
    }

    /// Embed and upsert every document, dropping vectors of documents that
    /// are no longer in the set. Returns how many documents were indexed.
    pub async fn index_corpus(&self, docs: &[Document]) -> Result<usize> {
        let mut indexed = self.indexed.lock().await;
        let current: HashSet<String> = docs.iter().map(|d| vector_id(&d.id)).collect();

        for stale in indexed.difference(&current) {
            if let Err(e) = self.index.delete(stale).await {
                warn!("Failed to delete stale document vector {}: {}", stale, e);
            }
        }
        indexed.retain(|id| current.contains(id));

        let mut count = 0;
        for doc in docs {
            let embedding = self.embedder.embed(&doc.embedding_text()).await?;
            let mut metadata = Metadata::new();
            metadata.insert("kind".to_string(), DOCUMENT_VECTOR_KIND.to_string());
            metadata.insert("document_id".to_string(), doc.id.clone());

            let id = vector_id(&doc.id);
            self.index.upsert(&id, embedding, metadata).await?;
            indexed.insert(id);
            count += 1;
        }

        info!(
            "Indexed {} documents into vector index '{}'",
            count,
            self.index.name()
        );
        Ok(count)
    }

    /// Neighbours of `query` among `docs`; hits for documents missing from
    /// `docs` (a stale index) are dropped
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        docs: &[Document],
    ) -> Result<Vec<RetrievalMatch>> {
        let embedding = self.embedder.embed(query).await?;
        let filter = MetadataFilter::new().eq("kind", DOCUMENT_VECTOR_KIND);
        let hits = self.index.query(&embedding, top_k, Some(&filter)).await?;

        let by_id: HashMap<&str, &Document> = docs.iter().map(|d| (d.id.as_str(), d)).collect();
        let matches: Vec<RetrievalMatch> = hits
            .into_iter()
            .filter_map(|hit| {
                let doc_id = hit.metadata.get("document_id")?;
                match by_id.get(doc_id.as_str()) {
                    Some(doc) => Some(RetrievalMatch::from_document(
                        doc,
                        hit.score.max(0.0),
                        Strategy::Vector,
                    )),
                    None => {
                        debug!("Vector hit for unknown document {}", doc_id);
                        None
                    }
                }
            })
            .collect();

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_store::vector::{HashingEmbedder, InMemoryVectorIndex};

    fn strategy() -> (VectorStrategy, Arc<InMemoryVectorIndex>) {
        let index = Arc::new(InMemoryVectorIndex::new());
        let strategy = VectorStrategy::new(index.clone(), Arc::new(HashingEmbedder::default()));
        (strategy, index)
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let (strategy, _) = strategy();
        let docs = vec![
            Document::new("funding", "Seed funding", "seed funding rounds for startups"),
            Document::new("weather", "Weather", "rain and sunshine forecast"),
        ];
        assert_eq!(strategy.index_corpus(&docs).await.unwrap(), 2);

        let results = strategy.search("startup seed funding", 2, &docs).await.unwrap();
        assert_eq!(results[0].document_id, "funding");
        assert_eq!(results[0].strategy, Strategy::Vector);
        assert!(results.iter().all(|m| (0.0..=1.0).contains(&m.score)));
    }

    #[tokio::test]
    async fn test_reindex_drops_stale_vectors() {
        let (strategy, index) = strategy();
        let old = vec![
            Document::new("a", "A", "alpha"),
            Document::new("b", "B", "beta"),
        ];
        strategy.index_corpus(&old).await.unwrap();
        assert_eq!(index.len().await, 2);

        let new = vec![Document::new("b", "B", "beta")];
        strategy.index_corpus(&new).await.unwrap();
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_hits_outside_snapshot_are_dropped() {
        let (strategy, _) = strategy();
        let docs = vec![Document::new("a", "A", "alpha topic")];
        strategy.index_corpus(&docs).await.unwrap();

        let results = strategy.search("alpha topic", 5, &[]).await.unwrap();
        assert!(results.is_empty());
    }
}
