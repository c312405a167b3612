//! Pattern strategy: topical bucket classification
//!
//! The query is assigned to one fixed bucket by marker overlap, then every
//! document is scored by its affinity to that bucket's vocabulary. Documents
//! pre-tagged with the bucket get a floor score, which lets the strategy
//! surface paraphrased documents that share no tokens with the query.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::tokenize::{contains_cjk, tokenize};
use super::types::{RetrievalMatch, Strategy};
use crate::corpus::Document;

const BODY_HIT: f32 = 0.3;
const TITLE_HIT: f32 = 0.5;
const COVERAGE_WEIGHT: f32 = 0.2;
const TAGGED_FLOOR: f32 = 0.6;
const TAGGED_SPAN: f32 = 0.4;
const UNTAGGED_SPAN: f32 = 0.8;

/// Topical bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Investment,
    CompanyProfile,
    MarketTrend,
    Technology,
}

impl Category {
    /// Declaration order doubles as tie-break order
    pub const ALL: [Category; 4] = [
        Category::Investment,
        Category::CompanyProfile,
        Category::MarketTrend,
        Category::Technology,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Investment => "investment",
            Self::CompanyProfile => "company-profile",
            Self::MarketTrend => "market-trend",
            Self::Technology => "technology",
        }
    }

    /// Words that put a query into this bucket
    fn query_markers(&self) -> &'static [&'static str] {
        match self {
            Self::Investment => &["投资", "融资", "轮次", "vc", "funding", "investment", "investor"],
            Self::CompanyProfile => &["公司", "创业", "企业", "startup", "company"],
            Self::MarketTrend => &["趋势", "市场", "前景", "trend", "market"],
            Self::Technology => &["技术", "ai", "人工智能", "tech", "technology"],
        }
    }

    /// Vocabulary that marks a document as belonging to this bucket
    fn content_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Investment => &["投资", "融资", "资金", "轮次", "估值", "vc", "基金", "funding"],
            Self::CompanyProfile => &["公司", "初创", "创业", "企业", "团队", "独角兽", "startup"],
            Self::MarketTrend => &["趋势", "市场", "发展", "前景", "预测", "未来", "trend"],
            Self::Technology => &["技术", "ai", "人工智能", "算法", "模型"],
        }
    }

    /// Classify a query; `None` when no marker is present.
    /// Ties go to the bucket declared first.
    pub fn classify(query: &str) -> Option<Category> {
        let lowered = query.to_lowercase();
        let tokens = tokenize(query);

        let mut best: Option<(Category, usize)> = None;
        for category in Self::ALL {
            let hits = category
                .query_markers()
                .iter()
                .filter(|marker| marker_present(marker, &lowered, &tokens))
                .count();
            if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
                best = Some((category, hits));
            }
        }
        best.map(|(category, _)| category)
    }

    /// Whether the document is pre-tagged with this bucket
    fn is_tagged(&self, doc: &Document) -> bool {
        doc.tags.iter().any(|tag| {
            let tag = tag.trim().to_lowercase();
            !tag.is_empty()
                && (tag == self.name()
                    || self
                        .content_keywords()
                        .iter()
                        .any(|kw| tag.contains(kw) || kw.contains(tag.as_str())))
        })
    }

    /// Vocabulary affinity of a document in `[0, 1]`
    fn affinity(&self, doc: &Document) -> f32 {
        let title = doc.title.to_lowercase();
        let body = doc.content.to_lowercase();
        let keywords = self.content_keywords();

        let mut score = 0.0;
        let mut matched = 0usize;
        for kw in keywords {
            let in_body = body.contains(kw);
            let in_title = title.contains(kw);
            if in_body {
                score += BODY_HIT;
            }
            if in_title {
                score += TITLE_HIT;
            }
            if in_body || in_title {
                matched += 1;
            }
        }

        let coverage = matched as f32 / keywords.len() as f32;
        (score + coverage * COVERAGE_WEIGHT).min(1.0)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CJK markers match as substrings; Latin markers must be whole tokens
/// (a trailing plural `s` is allowed)
fn marker_present(marker: &str, lowered: &str, tokens: &[String]) -> bool {
    if contains_cjk(marker) {
        lowered.contains(marker)
    } else {
        tokens
            .iter()
            .any(|t| t == marker || t.strip_suffix('s') == Some(marker))
    }
}

#[derive(Debug, Clone)]
pub struct PatternStrategy {
    min_score: f32,
    limit: usize,
}

impl Default for PatternStrategy {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            limit: 5,
        }
    }
}

impl PatternStrategy {
    pub fn new(min_score: f32, limit: usize) -> Self {
        Self { min_score, limit }
    }

    pub fn search(&self, query: &str, docs: &[Document]) -> Vec<RetrievalMatch> {
        let Some(category) = Category::classify(query) else {
            return Vec::new();
        };

        let mut matches: Vec<RetrievalMatch> = docs
            .iter()
            .filter_map(|doc| {
                let affinity = category.affinity(doc);
                let score = if category.is_tagged(doc) {
                    TAGGED_FLOOR + TAGGED_SPAN * affinity
                } else {
                    UNTAGGED_SPAN * affinity
                };
                (score >= self.min_score)
                    .then(|| RetrievalMatch::from_document(doc, score, Strategy::Pattern))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        matches.truncate(self.limit);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_buckets() {
        assert_eq!(Category::classify("最近的融资轮次"), Some(Category::Investment));
        assert_eq!(Category::classify("Which startups raised?"), Some(Category::CompanyProfile));
        assert_eq!(Category::classify("市场前景"), Some(Category::MarketTrend));
        assert_eq!(Category::classify("hello there"), None);
    }

    #[test]
    fn test_classify_tie_prefers_declaration_order() {
        // one investment marker, one trend marker
        assert_eq!(Category::classify("funding trend"), Some(Category::Investment));
    }

    #[test]
    fn test_latin_markers_need_whole_tokens() {
        // "ai" inside "said" must not classify as technology
        assert_eq!(Category::classify("she said hello"), None);
        assert_eq!(Category::classify("AI models"), Some(Category::Technology));
    }

    #[test]
    fn test_tagged_documents_rank_above_untagged() {
        let docs = vec![
            Document::new("tagged", "Quarterly note", "Nothing topical here").with_tags(["investment"]),
            Document::new("untagged", "融资与估值", "基金投资和轮次"),
            Document::new("unrelated", "Weather", "Sunny all week"),
        ];

        let results = PatternStrategy::default().search("vc funding", &docs);
        let ids: Vec<&str> = results.iter().map(|m| m.document_id.as_str()).collect();
        assert!(ids.contains(&"tagged"));
        assert!(ids.contains(&"untagged"));
        assert!(!ids.contains(&"unrelated"));

        let tagged = results.iter().find(|m| m.document_id == "tagged").unwrap();
        assert!((tagged.score - 0.6).abs() < 1e-6);
        assert!(results.iter().all(|m| (0.0..=1.0).contains(&m.score)));
    }

    #[test]
    fn test_tag_overlapping_category_keyword_counts_as_tagged() {
        let doc = Document::new("d", "t", "body").with_tags(["投资趋势"]);
        assert!(Category::Investment.is_tagged(&doc));
        assert!(Category::MarketTrend.is_tagged(&doc));
        assert!(!Category::Technology.is_tagged(&doc));
    }

    #[test]
    fn test_limit_and_threshold() {
        let docs: Vec<Document> = (0..8)
            .map(|i| Document::new(format!("d{i}"), "投资", "融资").with_tags(["investment"]))
            .collect();
        let strategy = PatternStrategy::new(0.3, 5);
        assert_eq!(strategy.search("投资", &docs).len(), 5);

        let strict = PatternStrategy::new(1.1, 5);
        assert!(strict.search("投资", &docs).is_empty());
    }
}
