//! Knowledge corpus
//!
//! Documents come from an out-of-band ETL as JSON in one of two shapes,
//! `{"documents": [...]}` or `{"nodes": [...]}`. Both are parsed leniently:
//! unknown fields are ignored, missing ids and titles are filled in, and
//! records without usable content are skipped.
//!
//! The live document set is held as an immutable snapshot behind a lock, so
//! a reload swaps it atomically and in-flight queries keep reading the
//! snapshot they started with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Minimum trimmed content length for graph-node records
const MIN_NODE_CONTENT_CHARS: usize = 20;

const UNTITLED_DOCUMENT: &str = "飞书文档";

/// One retrievable knowledge document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Free-form kind, e.g. `analysis`, `research`, `node`
    pub doc_type: String,
    /// Origin label shown in source attributions
    pub source: String,
    /// Curated keywords and category tags
    pub tags: Vec<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            doc_type: "document".to_string(),
            source: "knowledge-base".to_string(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    /// Text embedded for vector retrieval
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.content)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Documents { documents: Vec<serde_json::Value> },
    Nodes { nodes: Vec<serde_json::Value> },
    List(Vec<serde_json::Value>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecord {
    id: Option<serde_json::Value>,
    title: Option<String>,
    content: Option<String>,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    source: Option<String>,
    keywords: Option<Vec<String>>,
    #[serde(rename = "searchKeywords")]
    search_keywords: Option<Vec<String>>,
    #[serde(rename = "semanticTags")]
    semantic_tags: Option<Vec<String>>,
    tags: Option<Vec<String>>,
}

impl RawRecord {
    fn into_document(self, min_content_chars: usize) -> Option<Document> {
        let content = self.content?.trim().to_string();
        if content.is_empty() || content.chars().count() < min_content_chars {
            return None;
        }

        let id = match self.id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => format!("doc-{}", uuid::Uuid::new_v4()),
        };
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_DOCUMENT.to_string());

        let mut tags = self.keywords.unwrap_or_default();
        for tag in self
            .search_keywords
            .into_iter()
            .chain(self.semantic_tags)
            .chain(self.tags)
            .flatten()
        {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let mut doc = Document::new(id, title, content).with_tags(tags);
        if let Some(doc_type) = self.doc_type {
            doc.doc_type = doc_type;
        }
        if let Some(source) = self.source {
            doc.source = source;
        }
        Some(doc)
    }
}

/// Parse a corpus file body in any of the supported shapes
pub fn parse_corpus(raw: &str) -> Result<Vec<Document>> {
    let file: CorpusFile =
        serde_json::from_str(raw).context("Corpus is not a documents/nodes JSON file")?;

    let (records, min_chars) = match file {
        CorpusFile::Documents { documents } => (documents, 1),
        CorpusFile::Nodes { nodes } => (nodes, MIN_NODE_CONTENT_CHARS),
        CorpusFile::List(records) => (records, 1),
    };

    let total = records.len();
    let docs: Vec<Document> = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<RawRecord>(value) {
            Ok(record) => record.into_document(min_chars),
            Err(e) => {
                warn!("Skipping malformed corpus record #{}: {}", i, e);
                None
            }
        })
        .collect();

    if docs.len() < total {
        debug!("Skipped {} corpus records without usable content", total - docs.len());
    }
    Ok(docs)
}

/// Read and parse a corpus file
pub async fn load_corpus_file(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read corpus file {:?}", path))?;
    let docs = parse_corpus(&raw).with_context(|| format!("Invalid corpus file {:?}", path))?;
    info!("Loaded {} documents from {:?}", docs.len(), path);
    Ok(docs)
}

/// Built-in knowledge base used when no corpus file is configured
pub fn builtin_documents() -> Vec<Document> {
    vec![
        Document::new(
            "kb-investment-trends",
            "AI投资趋势分析",
            "2024年AI投资趋势分析：全球AI创投市场呈现分化趋势，企业级应用成为投资重点。\
             资金流向：B2B AI解决方案获得60%的投资份额，消费级AI应用投资下降30%。\
             地理分布：美国保持45%市场份额，中国25%，欧洲15%，其他地区15%。\
             轮次分布：A轮和B轮最为活跃，种子轮投资趋于谨慎，C轮及以后重点关注收入增长。",
        )
        .with_type("analysis")
        .with_source("SVTR知识库")
        .with_tags(["投资趋势", "B2B AI", "企业级应用", "地理分布", "轮次分析"]),
        Document::new(
            "kb-startup-success",
            "AI初创企业成功要素",
            "AI初创企业成功要素研究：基于SVTR.AI追踪的10761家AI公司数据分析。\
             技术要素：拥有PhD级别技术团队的公司成功率高出3倍，专有数据优势是关键护城河。\
             商业要素：清晰的企业级收入模式、合理的客户获取成本、强大的销售执行能力。\
             资本要素：适度的融资节奏、明确的里程碑设定、投资人的战略价值贡献。",
        )
        .with_type("research")
        .with_source("SVTR知识库")
        .with_tags(["初创企业", "成功要素", "PhD团队", "专有数据", "企业级收入"]),
    ]
}

/// Swappable snapshot of the live document set
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    docs: Arc<RwLock<Arc<Vec<Document>>>>,
}

impl Corpus {
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            docs: Arc::new(RwLock::new(Arc::new(docs))),
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_documents())
    }

    /// The current document set; unaffected by later `replace` calls
    pub async fn snapshot(&self) -> Arc<Vec<Document>> {
        self.docs.read().await.clone()
    }

    /// Swap in a new document set, returning the previous size
    pub async fn replace(&self, docs: Vec<Document>) -> usize {
        let mut guard = self.docs.write().await;
        let previous = guard.len();
        *guard = Arc::new(docs);
        info!("Corpus replaced: {} -> {} documents", previous, guard.len());
        previous
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &str) -> Option<Document> {
        self.docs.read().await.iter().find(|d| d.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_documents_shape() {
        let raw = r#"{
            "documents": [
                {"id": "d1", "title": "Funding", "content": "Series A rounds grew", "type": "report",
                 "source": "feishu", "keywords": ["funding"], "searchKeywords": ["series a", "funding"]},
                {"content": "Untitled body text"},
                {"id": "empty", "title": "No content", "content": "   "}
            ]
        }"#;

        let docs = parse_corpus(raw).unwrap();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0].id, "d1");
        assert_eq!(docs[0].doc_type, "report");
        assert_eq!(docs[0].source, "feishu");
        assert_eq!(docs[0].tags, vec!["funding".to_string(), "series a".to_string()]);

        assert!(docs[1].id.starts_with("doc-"));
        assert_eq!(docs[1].title, UNTITLED_DOCUMENT);
    }

    #[test]
    fn test_parse_nodes_shape_skips_short_content() {
        let raw = r#"{
            "nodes": [
                {"id": 7, "title": "Node", "content": "A sufficiently long node body for retrieval",
                 "semanticTags": ["investment"]},
                {"id": "short", "title": "Short", "content": "too short"}
            ],
            "edges": []
        }"#;

        let docs = parse_corpus(raw).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "7");
        assert_eq!(docs[0].tags, vec!["investment".to_string()]);
    }

    #[test]
    fn test_parse_tolerates_null_lists_and_bad_records() {
        let raw = r#"{
            "documents": [
                {"id": "a", "title": "Alpha", "content": "alpha body", "searchKeywords": null,
                 "keywords": null, "tags": ["seed"]},
                {"id": "b", "title": "Beta", "content": "beta body", "tags": null},
                {"id": "c", "title": "Gamma", "content": "gamma body", "tags": "not-a-list"},
                "stray string"
            ]
        }"#;

        let docs = parse_corpus(raw).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(docs[0].tags, vec!["seed".to_string()]);
        assert!(docs[1].tags.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_shape() {
        assert!(parse_corpus(r#"{"rows": 3}"#).is_err());
        assert!(parse_corpus("not json").is_err());
    }

    #[tokio::test]
    async fn test_load_corpus_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a", "title": "A", "content": "alpha content"}}]"#
        )
        .unwrap();

        let docs = load_corpus_file(file.path()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "A");
    }

    #[tokio::test]
    async fn test_replace_keeps_old_snapshot() {
        let corpus = Corpus::builtin();
        let before = corpus.snapshot().await;
        assert_eq!(before.len(), 2);

        let previous = corpus
            .replace(vec![Document::new("x", "X", "replacement")])
            .await;
        assert_eq!(previous, 2);
        assert_eq!(before.len(), 2);
        assert_eq!(corpus.len().await, 1);
        assert!(corpus.get("x").await.is_some());
        assert!(corpus.get("kb-investment-trends").await.is_none());
    }
}
