pub mod api;
pub mod assistant;
pub mod config;
pub mod corpus;
pub mod error;
pub mod generation;
pub mod prompt;
pub mod retrieval;
pub mod router;
pub mod streaming;

pub use api::{ApiServer, ApiServerConfig};
pub use assistant::{Assistant, CachedAnswer, ANSWER_SCHEMA};
pub use config::AppConfig;
pub use corpus::{Corpus, Document};
pub use error::{GenerationError, SynthesisError};
pub use generation::{
    ChatMessage, ExtractiveBackend, GenerationBackend, GenerationRequest, OpenAiCompatibleBackend,
    Role, TokenStream,
};
pub use retrieval::{
    HybridConfig, HybridRetriever, RetrievalContext, RetrievalMatch, RetrievalOptions, Strategy,
};
pub use router::{ComplexityTier, Intent, QueryRouter, RouteDecision};
pub use streaming::{ChunkKind, ChunkPayload, ChunkStream, StreamChunk, Synthesizer, SynthesizerConfig};
