//! Answer pipeline
//!
//! Wires the router, the tiered cache, hybrid retrieval, a generation
//! backend and the synthesizer into a single chunk stream per question:
//!
//! ```text
//! query -> router -> answer cache --hit--> replay -> chunks
//!                         |
//!                        miss -> retrieval -> prompt -> generation -> chunks
//!                                                                       |
//!                                                   answer cache write <+ (on completion)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_stream::try_stream;
use futures::{stream, StreamExt};
use lumen_store::cache::{start_auto_cleanup, CacheKeyBuilder, GetOptions, SetOptions, TieredCache};
use lumen_store::durable::{DurableStore, FileDurableStore, MemoryDurableStore};
use lumen_store::vector::{Embedder, HashingEmbedder, InMemoryVectorIndex, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, GenerationSettings};
use crate::corpus::{builtin_documents, load_corpus_file, Corpus, Document};
use crate::error::SynthesisError;
use crate::generation::{
    boxed_tokens, ChatMessage, ExtractiveBackend, GenerationBackend, GenerationRequest,
    OpenAiCompatibleBackend, OpenAiEmbedder, Role, TokenStream,
};
use crate::prompt::{build_messages, build_system_prompt};
use crate::retrieval::{HybridConfig, HybridRetriever, RetrievalContext, RetrievalOptions, CORPUS_TAG};
use crate::router::{ModelTable, QueryRouter, RouteDecision};
use crate::streaming::{
    boxed_chunks, CacheStatus, ChunkStream, MetadataPayload, StreamChunk, Synthesizer,
    SynthesizerConfig,
};

/// Schema tag of cached answers
pub const ANSWER_SCHEMA: &str = "lumen/answer/v1";

/// Completed answer and the retrieval context it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub answer: String,
    pub context: RetrievalContext,
}

/// Question-answering pipeline; cheap to clone
#[derive(Clone)]
pub struct Assistant {
    router: QueryRouter,
    retriever: Arc<HybridRetriever>,
    backend: Arc<dyn GenerationBackend>,
    cache: Arc<TieredCache>,
    synthesizer: Synthesizer,
    replay: Synthesizer,
    generation: GenerationSettings,
    top_k: usize,
    corpus_path: Option<PathBuf>,
}

impl Assistant {
    pub fn new(
        router: QueryRouter,
        retriever: Arc<HybridRetriever>,
        backend: Arc<dyn GenerationBackend>,
        cache: Arc<TieredCache>,
    ) -> Self {
        let top_k = retriever.config().default_top_k;
        let synthesizer = Synthesizer::default();
        Self {
            router,
            retriever,
            backend,
            cache,
            replay: replay_synthesizer(&synthesizer),
            synthesizer,
            generation: GenerationSettings::default(),
            top_k,
            corpus_path: None,
        }
    }

    pub fn with_synthesizer(mut self, config: SynthesizerConfig) -> Self {
        self.synthesizer = Synthesizer::new(config);
        self.replay = replay_synthesizer(&self.synthesizer);
        self
    }

    pub fn with_generation(mut self, settings: GenerationSettings) -> Self {
        self.generation = settings;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Corpus file re-read by [`Assistant::reload_corpus`]
    pub fn with_corpus_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.corpus_path = Some(path.into());
        self
    }

    /// Build the full pipeline from configuration: cache tiers, corpus,
    /// vector index, generation backend.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let durable: Arc<dyn DurableStore> = match &config.cache.durable_dir {
            Some(dir) => Arc::new(
                FileDurableStore::open(dir)
                    .await
                    .with_context(|| format!("Failed to open cache directory {:?}", dir))?,
            ),
            None => Arc::new(MemoryDurableStore::new()),
        };

        let embedder: Arc<dyn Embedder> = match OpenAiEmbedder::from_settings(&config.generation)? {
            Some(embedder) => Arc::new(embedder),
            None => Arc::new(HashingEmbedder::default()),
        };
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());

        let cache_config = config.cache.to_cache_config();
        let auto_cleanup = cache_config.enable_auto_cleanup;
        let cache = Arc::new(
            TieredCache::new(cache_config)?
                .with_durable(durable)
                .with_vector(index.clone(), embedder.clone()),
        );
        if auto_cleanup {
            tokio::spawn(start_auto_cleanup(cache.clone()));
        }

        let docs = match &config.corpus.path {
            Some(path) => load_corpus_file(path).await?,
            None => builtin_documents(),
        };
        info!("Corpus loaded: {} documents", docs.len());

        let retriever = HybridRetriever::new(
            Corpus::new(docs),
            HybridConfig::from(config.retrieval.clone()),
        )
        .with_vector(index, embedder)
        .with_cache(cache.clone());
        match retriever.index_corpus().await {
            Ok(count) => info!("Indexed {} documents for vector retrieval", count),
            Err(e) => warn!("Vector indexing failed, continuing without it: {}", e),
        }

        let backend: Arc<dyn GenerationBackend> =
            match OpenAiCompatibleBackend::from_settings(&config.generation)? {
                Some(backend) => Arc::new(backend),
                None => {
                    info!("No generation endpoint configured, using the extractive backend");
                    Arc::new(ExtractiveBackend::new())
                }
            };

        let router = QueryRouter::new(config.router.clone(), ModelTable::from(&config.generation));
        let mut assistant = Self::new(router, Arc::new(retriever), backend, cache)
            .with_synthesizer(SynthesizerConfig::from(&config.streaming))
            .with_generation(config.generation.clone())
            .with_top_k(config.retrieval.top_k);
        if let Some(path) = &config.corpus.path {
            assistant = assistant.with_corpus_path(path);
        }
        Ok(assistant)
    }

    pub fn router(&self) -> &QueryRouter {
        &self.router
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Answer a single question
    pub fn answer(&self, query: &str) -> ChunkStream {
        self.answer_conversation(vec![ChatMessage::user(query)])
    }

    /// Answer the last user message of a conversation.
    ///
    /// The stream starts with a metadata chunk. The completed answer is
    /// written to the cache once the stream has been fully consumed; a
    /// stream dropped early writes nothing.
    pub fn answer_conversation(&self, conversation: Vec<ChatMessage>) -> ChunkStream {
        let this = self.clone();
        let query = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();

        let stream = try_stream! {
            let decision = this.router.classify(&query);
            let key = CacheKeyBuilder::answer(&query);
            debug!(
                "Routed '{}': {} (score {}), intent {:?}, skip retrieval {}",
                query, decision.complexity, decision.score, decision.intent, decision.skip_retrieval
            );

            let lookup = GetOptions::similar(query.clone());
            if let Some(cached) = this.cache.get_json::<CachedAnswer>(&key, ANSWER_SCHEMA, &lookup).await {
                info!("Answer cache hit for '{}'", query);
                yield StreamChunk::metadata(MetadataPayload::new(&decision, CacheStatus::Hit));

                let tokens = replay_tokens(&cached.answer);
                let mut chunks = this.replay.synthesize(tokens, Arc::new(cached.context), &query);
                while let Some(chunk) = chunks.next().await {
                    yield chunk?;
                }
            } else {
                yield StreamChunk::metadata(MetadataPayload::new(&decision, CacheStatus::Miss));

                let context = Arc::new(this.gather_context(&query, &decision).await);
                let tokens = this.start_generation(&decision, &context, &conversation).await?;

                let mut answer = String::new();
                let mut chunks = this.synthesizer.synthesize(tokens, context.clone(), &query);
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    if let Some(text) = chunk.text() {
                        answer.push_str(text);
                    }
                    yield chunk;
                }

                this.remember(key, &query, answer, context.as_ref().clone()).await;
            }
        };
        boxed_chunks(stream)
    }

    async fn gather_context(&self, query: &str, decision: &RouteDecision) -> RetrievalContext {
        if decision.skip_retrieval {
            debug!("Skipping retrieval for '{}'", query);
            return RetrievalContext::empty(query);
        }
        let options = RetrievalOptions::new().with_expansion(decision.expansion.clone());
        self.retriever.retrieve_with(query, self.top_k, &options).await
    }

    async fn start_generation(
        &self,
        decision: &RouteDecision,
        context: &RetrievalContext,
        conversation: &[ChatMessage],
    ) -> std::result::Result<TokenStream, SynthesisError> {
        let system = build_system_prompt(decision, context);
        let messages = build_messages(system, conversation, self.generation.history_messages);

        let mut request = GenerationRequest::new(decision.model.clone(), messages);
        request.max_tokens = self.generation.max_tokens;
        request.temperature = self.generation.temperature;
        request.top_p = self.generation.top_p;

        self.backend.generate(request).await.map_err(|e| {
            error!("Generation backend {} failed: {}", self.backend.name(), e);
            SynthesisError::from(e)
        })
    }

    /// Best-effort answer cache write; tiers 2 and 3 settle in the background
    async fn remember(&self, key: String, query: &str, answer: String, context: RetrievalContext) {
        if answer.trim().is_empty() {
            return;
        }
        let cached = CachedAnswer { answer, context };
        let options = SetOptions::default()
            .with_tag(CORPUS_TAG)
            .vector_eligible(query);
        let value = match lumen_store::CacheValue::json(ANSWER_SCHEMA, &cached) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode answer for caching: {}", e);
                return;
            }
        };
        self.cache.set_default(key, value, options).await;
    }

    /// Re-read the corpus file (or the built-in corpus) and swap it in.
    /// Returns the new document count.
    pub async fn reload_corpus(&self) -> Result<usize> {
        let docs: Vec<Document> = match &self.corpus_path {
            Some(path) => load_corpus_file(path).await?,
            None => builtin_documents(),
        };
        let count = self.retriever.reload(docs).await;
        info!("Corpus reloaded: {} documents", count);
        Ok(count)
    }
}

fn replay_synthesizer(synthesizer: &Synthesizer) -> Synthesizer {
    Synthesizer::new(SynthesizerConfig {
        thinking_delay: Duration::ZERO,
        ..synthesizer.config().clone()
    })
}

/// Token stream replaying a finished answer line by line
fn replay_tokens(answer: &str) -> TokenStream {
    let lines: Vec<crate::error::Result<String>> = answer
        .split_inclusive('\n')
        .map(|line| Ok(line.to_string()))
        .collect();
    boxed_tokens(stream::iter(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{ChunkKind, ChunkPayload};
    use lumen_store::cache::CacheConfig;

    fn assistant() -> Assistant {
        let cache = Arc::new(TieredCache::new(CacheConfig::ephemeral()).unwrap());
        let retriever = HybridRetriever::new(Corpus::builtin(), HybridConfig::default())
            .with_cache(cache.clone());
        Assistant::new(
            QueryRouter::default(),
            Arc::new(retriever),
            Arc::new(ExtractiveBackend::new()),
            cache,
        )
        .with_synthesizer(SynthesizerConfig {
            thinking_delay: Duration::ZERO,
            sources_limit: 3,
        })
    }

    async fn collect(stream: ChunkStream) -> Vec<StreamChunk> {
        stream.map(|c| c.unwrap()).collect().await
    }

    fn cache_status(chunks: &[StreamChunk]) -> CacheStatus {
        match &chunks[0].payload {
            ChunkPayload::Metadata(meta) => meta.cache,
            other => panic!("expected metadata first, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_tokens_preserve_text() {
        let text = "line one\nline two\nend";
        let tokens = futures::executor::block_on(
            replay_tokens(text).map(|t| t.unwrap()).collect::<Vec<_>>(),
        );
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens.concat(), text);
    }

    #[tokio::test]
    async fn test_miss_then_hit_replays_same_answer() {
        let assistant = assistant();

        let first = collect(assistant.answer("AI投资趋势如何")).await;
        assert_eq!(cache_status(&first), CacheStatus::Miss);
        let first_text: String = first.iter().filter_map(|c| c.text()).collect();
        assert!(!first_text.is_empty());

        let second = collect(assistant.answer("AI投资趋势如何")).await;
        assert_eq!(cache_status(&second), CacheStatus::Hit);
        let second_text: String = second.iter().filter_map(|c| c.text()).collect();
        assert_eq!(first_text, second_text);

        let kinds: Vec<ChunkKind> = second.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds.last(), Some(&ChunkKind::Sources));
    }

    #[tokio::test]
    async fn test_abandoned_stream_writes_nothing() {
        let assistant = assistant();
        let mut stream = assistant.answer("AI投资趋势如何");
        // metadata and the first thinking chunk only
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        let key = CacheKeyBuilder::answer("AI投资趋势如何");
        assert!(!assistant.cache().contains(&key).await);
    }

    #[tokio::test]
    async fn test_reload_corpus_invalidates_answers() {
        let assistant = assistant();
        collect(assistant.answer("AI投资趋势如何")).await;
        let key = CacheKeyBuilder::answer("AI投资趋势如何");
        assert!(assistant.cache().contains(&key).await);

        let count = assistant.reload_corpus().await.unwrap();
        assert_eq!(count, builtin_documents().len());
        assert!(!assistant.cache().contains(&key).await);
    }
}
