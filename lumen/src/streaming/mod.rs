//! Streaming response synthesis
//!
//! A synthesized answer is an ordered sequence of [`StreamChunk`]s: an
//! optional leading metadata chunk, zero or more thinking chunks, one or more
//! content chunks and at most one sources chunk. On the wire each chunk is a
//! JSON frame `{type, data, metadata}` and the stream ends with
//! [`DONE_SENTINEL`].

mod chunk;
mod synthesizer;

pub use chunk::{
    error_frame, CacheStatus, ChunkKind, ChunkPayload, ContentPayload, MetadataPayload,
    SourceRef, SourcesPayload, StreamChunk, ThinkingPayload, ThinkingStep, DONE_SENTINEL,
};
pub use synthesizer::{
    boxed_chunks, content_confidence, ChunkStream, Synthesizer, SynthesizerConfig,
};
