//! Hybrid retrieval engine
//!
//! Three independent strategies scored against the same corpus snapshot:
//! - Keyword: weighted token presence (language-aware tokenizer)
//! - Pattern: topical bucket classification
//! - Vector: nearest neighbours in an embedding index (optional)
//!
//! Outputs are merged by document id keeping the highest score, then ranked
//! and truncated. A failing or slow strategy contributes nothing; retrieval
//! itself never fails.

pub mod hybrid;
pub mod keyword;
pub mod pattern;
pub mod tokenize;
pub mod types;
pub mod vector;

pub use hybrid::{merge_matches, retrieval_schema, HybridConfig, HybridRetriever, CORPUS_TAG, RETRIEVAL_SCHEMA};
pub use keyword::KeywordStrategy;
pub use pattern::{Category, PatternStrategy};
pub use tokenize::tokenize;
pub use types::{RetrievalContext, RetrievalMatch, RetrievalOptions, Strategy};
pub use vector::{VectorStrategy, DOCUMENT_VECTOR_KIND};
