//! Common types for retrieval

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::corpus::Document;

/// Retrieval strategy that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Keyword,
    Pattern,
    Vector,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Pattern => "pattern",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate knowledge snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub document_id: String,
    pub title: String,
    pub content: String,
    /// Relevance in `[0, 1]` from the strategy that scored it highest
    pub score: f32,
    /// Origin label of the document
    pub source_tag: String,
    /// Strategy that produced `score`
    pub strategy: Strategy,
    /// Every strategy that returned this document, sorted
    #[serde(default)]
    pub corroborated_by: Vec<Strategy>,
}

impl RetrievalMatch {
    pub fn from_document(doc: &Document, score: f32, strategy: Strategy) -> Self {
        Self {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            content: doc.content.clone(),
            score: score.clamp(0.0, 1.0),
            source_tag: doc.source.clone(),
            strategy,
            corroborated_by: vec![strategy],
        }
    }
}

/// Merged, ranked retrieval output for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub query: String,
    /// Ranked by descending score
    pub matches: Vec<RetrievalMatch>,
    /// Mean score of `matches`; zero when empty
    pub aggregate_confidence: f32,
    pub elapsed_ms: u64,
}

impl RetrievalContext {
    pub fn new(query: impl Into<String>, matches: Vec<RetrievalMatch>, elapsed_ms: u64) -> Self {
        let aggregate_confidence = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.score).sum::<f32>() / matches.len() as f32
        };
        Self {
            query: query.into(),
            matches,
            aggregate_confidence,
            elapsed_ms,
        }
    }

    /// Context for an ungrounded answer
    pub fn empty(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new(), 0)
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

/// Options for a single retrieval
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    /// Text fed to the strategies instead of the query (e.g. an intent expansion)
    pub expansion: Option<String>,
    /// Skip the cache for this call
    pub bypass_cache: bool,
}

impl RetrievalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expansion(mut self, expansion: impl Into<String>) -> Self {
        self.expansion = Some(expansion.into());
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}
