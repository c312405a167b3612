//! Stream chunk types and their wire frames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;
use crate::retrieval::RetrievalMatch;
use crate::router::{ComplexityTier, Intent, RouteDecision};

/// Terminal sentinel sent after the last frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// Chunk discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Metadata,
    Thinking,
    Content,
    Sources,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Thinking => "thinking",
            Self::Content => "content",
            Self::Sources => "sources",
        }
    }
}

/// Pipeline step reported by a thinking chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingStep {
    Understanding,
    Retrieved,
    Analyzing,
    Generating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingPayload {
    pub step: ThinkingStep,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub text: String,
}

/// One attributed source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub document_id: String,
    pub title: String,
    /// Retrieval score, unrelated to chunk confidence
    pub score: f32,
    pub source_tag: String,
}

impl From<&RetrievalMatch> for SourceRef {
    fn from(m: &RetrievalMatch) -> Self {
        Self {
            document_id: m.document_id.clone(),
            title: m.title.clone(),
            score: m.score,
            source_tag: m.source_tag.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesPayload {
    pub sources: Vec<SourceRef>,
    pub total_matches: usize,
    pub search_time_ms: u64,
}

/// Whether the answer came from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Routing and cache status of the answer, sent ahead of everything else
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    pub complexity: ComplexityTier,
    pub complexity_score: u32,
    pub intent: Intent,
    pub model: String,
    pub skip_retrieval: bool,
    pub cache: CacheStatus,
}

impl MetadataPayload {
    pub fn new(decision: &RouteDecision, cache: CacheStatus) -> Self {
        Self {
            complexity: decision.complexity,
            complexity_score: decision.score,
            intent: decision.intent,
            model: decision.model.clone(),
            skip_retrieval: decision.skip_retrieval,
            cache,
        }
    }
}

/// Per-variant chunk payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ChunkPayload {
    Metadata(MetadataPayload),
    Thinking(ThinkingPayload),
    Content(ContentPayload),
    Sources(SourcesPayload),
}

/// One discrete unit of the answer protocol
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub payload: ChunkPayload,
    /// Presentation heuristic; never a retrieval score
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    /// Fraction in `[0, 1]`
    pub progress: f32,
}

impl StreamChunk {
    pub fn new(payload: ChunkPayload, confidence: f32, progress: f32) -> Self {
        Self {
            payload,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            progress: progress.clamp(0.0, 1.0),
        }
    }

    pub fn thinking(step: ThinkingStep, message: impl Into<String>, progress: f32) -> Self {
        Self::new(
            ChunkPayload::Thinking(ThinkingPayload {
                step,
                message: message.into(),
            }),
            0.0,
            progress,
        )
    }

    pub fn content(text: impl Into<String>, confidence: f32) -> Self {
        Self::new(ChunkPayload::Content(ContentPayload { text: text.into() }), confidence, 1.0)
    }

    pub fn metadata(payload: MetadataPayload) -> Self {
        Self::new(ChunkPayload::Metadata(payload), 1.0, 0.0)
    }

    pub fn kind(&self) -> ChunkKind {
        match &self.payload {
            ChunkPayload::Metadata(_) => ChunkKind::Metadata,
            ChunkPayload::Thinking(_) => ChunkKind::Thinking,
            ChunkPayload::Content(_) => ChunkKind::Content,
            ChunkPayload::Sources(_) => ChunkKind::Sources,
        }
    }

    /// Text of a content chunk
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            ChunkPayload::Content(content) => Some(&content.text),
            _ => None,
        }
    }

    /// JSON body of the wire frame: `{type, data, metadata}`
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(&WireFrame {
            payload: &self.payload,
            metadata: FrameMetadata {
                confidence: self.confidence,
                timestamp: self.timestamp,
                progress: self.progress,
            },
        })
    }
}

#[derive(Serialize)]
struct WireFrame<'a> {
    #[serde(flatten)]
    payload: &'a ChunkPayload,
    metadata: FrameMetadata,
}

#[derive(Serialize)]
struct FrameMetadata {
    confidence: f32,
    timestamp: DateTime<Utc>,
    progress: f32,
}

/// JSON body of the terminal error frame
pub fn error_frame(error: &SynthesisError) -> String {
    serde_json::json!({
        "type": "error",
        "data": {
            "code": error.code(),
            "message": error.to_string(),
        },
    })
    .to_string()
}
