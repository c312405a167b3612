//! Hybrid retrieval combining keyword, pattern and vector strategies

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lumen_store::cache::{CacheKeyBuilder, GetOptions, SetOptions, TieredCache};
use lumen_store::vector::{Embedder, VectorIndex};
use tracing::{debug, info, warn};

use super::keyword::KeywordStrategy;
use super::pattern::PatternStrategy;
use super::types::{RetrievalContext, RetrievalMatch, RetrievalOptions};
use super::vector::VectorStrategy;
use crate::config::RetrievalSettings;
use crate::corpus::{Corpus, Document};

/// Schema tag of memoized retrieval contexts
pub const RETRIEVAL_SCHEMA: &str = "lumen/retrieval-context/v1";

/// Memo schema for contexts truncated to `top_k`. Similarity lookups are
/// filtered by schema, so a memo never serves a different `top_k`.
pub fn retrieval_schema(top_k: usize) -> String {
    format!("{}?k={}", RETRIEVAL_SCHEMA, top_k)
}

/// Tag carried by every cache entry derived from the corpus
pub const CORPUS_TAG: &str = "corpus";

/// Configuration for hybrid retrieval
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub default_top_k: usize,
    /// Budget for the whole vector strategy (embed + query)
    pub vector_timeout: Duration,
    pub pattern_min_score: f32,
    pub pattern_limit: usize,
    pub memo_ttl: Duration,
}

impl Default for HybridConfig {
    fn default() -> Self {
        RetrievalSettings::default().into()
    }
}

impl From<RetrievalSettings> for HybridConfig {
    fn from(settings: RetrievalSettings) -> Self {
        Self {
            default_top_k: settings.top_k,
            vector_timeout: Duration::from_millis(settings.vector_timeout_ms),
            pattern_min_score: settings.pattern_min_score,
            pattern_limit: settings.pattern_limit,
            memo_ttl: Duration::from_secs(settings.memo_ttl_secs),
        }
    }
}

impl HybridConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector_timeout(mut self, timeout: Duration) -> Self {
        self.vector_timeout = timeout;
        self
    }
}

/// Hybrid retrieval engine
pub struct HybridRetriever {
    corpus: Corpus,
    keyword: KeywordStrategy,
    pattern: PatternStrategy,
    vector: Option<VectorStrategy>,
    cache: Option<Arc<TieredCache>>,
    config: HybridConfig,
}

impl HybridRetriever {
    pub fn new(corpus: Corpus, config: HybridConfig) -> Self {
        Self {
            corpus,
            keyword: KeywordStrategy::new(),
            pattern: PatternStrategy::new(config.pattern_min_score, config.pattern_limit),
            vector: None,
            cache: None,
            config,
        }
    }

    /// Enable the vector strategy
    pub fn with_vector(mut self, index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        self.vector = Some(VectorStrategy::new(index, embedder));
        self
    }

    /// Memoize retrieval contexts in `cache`
    pub fn with_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn has_vector(&self) -> bool {
        self.vector.is_some()
    }

    /// Embed the current corpus into the vector index; zero when the vector
    /// strategy is disabled
    pub async fn index_corpus(&self) -> lumen_store::Result<usize> {
        match &self.vector {
            Some(vector) => {
                let docs = self.corpus.snapshot().await;
                vector.index_corpus(&docs).await
            }
            None => Ok(0),
        }
    }

    /// Swap the corpus, re-index it and drop every corpus-derived cache entry.
    /// Returns the new corpus size.
    pub async fn reload(&self, docs: Vec<Document>) -> usize {
        let count = docs.len();
        self.corpus.replace(docs).await;

        if let Err(e) = self.index_corpus().await {
            warn!("Vector indexing after reload failed: {}", e);
        }
        if let Some(cache) = &self.cache {
            let event = cache.invalidate_by_tag(CORPUS_TAG).await;
            info!("Corpus reload invalidated {} cache entries", event.count());
        }
        count
    }

    /// Retrieve the `top_k` best matches for `query`
    pub async fn retrieve(&self, query: &str, top_k: usize) -> RetrievalContext {
        self.retrieve_with(query, top_k, &RetrievalOptions::default())
            .await
    }

    pub async fn retrieve_with(
        &self,
        query: &str,
        top_k: usize,
        options: &RetrievalOptions,
    ) -> RetrievalContext {
        if top_k == 0 {
            return RetrievalContext::empty(query);
        }

        let search_text = options.expansion.as_deref().unwrap_or(query);
        let memo = self.cache.as_ref().filter(|_| !options.bypass_cache);
        let key = CacheKeyBuilder::retrieval(search_text, top_k);
        let schema = retrieval_schema(top_k);

        if let Some(cache) = memo {
            let lookup = GetOptions::similar(search_text);
            if let Some(cached) = cache
                .get_json::<RetrievalContext>(&key, &schema, &lookup)
                .await
            {
                debug!("Retrieval memo hit: {}", key);
                return RetrievalContext::new(query, cached.matches, cached.elapsed_ms);
            }
        }

        let start = Instant::now();
        let docs = self.corpus.snapshot().await;

        let (keyword, pattern, vector) = tokio::join!(
            async { self.keyword.search(search_text, &docs) },
            async { self.pattern.search(search_text, &docs) },
            self.vector_matches(search_text, top_k, &docs),
        );
        debug!(
            "Strategy matches for '{}': keyword {}, pattern {}, vector {}",
            search_text,
            keyword.len(),
            pattern.len(),
            vector.len()
        );

        let merged = merge_matches([keyword, pattern, vector], top_k);
        let context = RetrievalContext::new(query, merged, start.elapsed().as_millis() as u64);

        if let Some(cache) = memo {
            if !context.is_empty() {
                let options = SetOptions::default()
                    .with_tag(CORPUS_TAG)
                    .vector_eligible(search_text);
                if let Err(e) = cache
                    .set_json(key, &schema, &context, self.config.memo_ttl, options)
                    .await
                {
                    warn!("Failed to memoize retrieval context: {}", e);
                }
            }
        }

        context
    }

    async fn vector_matches(
        &self,
        query: &str,
        top_k: usize,
        docs: &[Document],
    ) -> Vec<RetrievalMatch> {
        let Some(vector) = &self.vector else {
            return Vec::new();
        };

        match tokio::time::timeout(self.config.vector_timeout, vector.search(query, top_k, docs)).await
        {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                warn!("Vector strategy failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Vector strategy timed out after {:?}",
                    self.config.vector_timeout
                );
                Vec::new()
            }
        }
    }
}

/// Union strategy outputs, keep the best score per document, rank and
/// truncate.
///
/// Scores are never summed: a document found by several strategies keeps the
/// highest single score and records every strategy in `corroborated_by`.
pub fn merge_matches(
    lists: impl IntoIterator<Item = Vec<RetrievalMatch>>,
    top_k: usize,
) -> Vec<RetrievalMatch> {
    let mut by_id: HashMap<String, RetrievalMatch> = HashMap::new();

    for m in lists.into_iter().flatten() {
        match by_id.get_mut(&m.document_id) {
            Some(existing) => {
                let mut strategies = existing.corroborated_by.clone();
                strategies.extend(m.corroborated_by.iter().copied());
                strategies.sort();
                strategies.dedup();

                if m.score > existing.score {
                    *existing = m;
                }
                existing.corroborated_by = strategies;
            }
            None => {
                by_id.insert(m.document_id.clone(), m);
            }
        }
    }

    let mut merged: Vec<RetrievalMatch> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    merged.truncate(top_k);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::types::Strategy;

    fn m(id: &str, score: f32, strategy: Strategy) -> RetrievalMatch {
        RetrievalMatch::from_document(&Document::new(id, id, "body"), score, strategy)
    }

    #[test]
    fn test_merge_keeps_max_score() {
        let merged = merge_matches(
            [
                vec![m("a", 0.4, Strategy::Keyword)],
                vec![m("a", 0.9, Strategy::Pattern)],
                vec![],
            ],
            10,
        );

        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - 0.9).abs() < 1e-6);
        assert_eq!(merged[0].strategy, Strategy::Pattern);
        assert_eq!(
            merged[0].corroborated_by,
            vec![Strategy::Keyword, Strategy::Pattern]
        );
    }

    #[test]
    fn test_merge_ranks_and_truncates() {
        let merged = merge_matches(
            [
                vec![m("low", 0.2, Strategy::Keyword), m("high", 0.8, Strategy::Keyword)],
                vec![m("mid", 0.5, Strategy::Vector), m("tie", 0.5, Strategy::Vector)],
            ],
            3,
        );
        let ids: Vec<&str> = merged.iter().map(|m| m.document_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "tie"]);
    }

    #[test]
    fn test_merge_lower_score_does_not_replace() {
        let merged = merge_matches(
            [
                vec![m("a", 0.7, Strategy::Vector)],
                vec![m("a", 0.3, Strategy::Keyword)],
            ],
            5,
        );
        assert!((merged[0].score - 0.7).abs() < 1e-6);
        assert_eq!(merged[0].strategy, Strategy::Vector);
        assert_eq!(
            merged[0].corroborated_by,
            vec![Strategy::Keyword, Strategy::Vector]
        );
    }
}
