//! Keyword strategy: weighted token presence in title and body

use super::tokenize::tokenize;
use super::types::{RetrievalMatch, Strategy};
use crate::corpus::Document;

const TITLE_WEIGHT: f32 = 2.0;
const BODY_WEIGHT: f32 = 1.0;

/// Scores documents by which query tokens they contain.
///
/// Each token contributes `2` if present in the title and `1` if present in
/// the body; the sum is divided by the best possible total so the score lands
/// in `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct KeywordStrategy;

impl KeywordStrategy {
    pub fn new() -> Self {
        Self
    }

    pub fn search(&self, query: &str, docs: &[Document]) -> Vec<RetrievalMatch> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let max_score = (TITLE_WEIGHT + BODY_WEIGHT) * tokens.len() as f32;
        let mut matches: Vec<RetrievalMatch> = docs
            .iter()
            .filter_map(|doc| {
                let title = doc.title.to_lowercase();
                let body = doc.content.to_lowercase();

                let raw: f32 = tokens
                    .iter()
                    .map(|token| {
                        let mut s = 0.0;
                        if title.contains(token.as_str()) {
                            s += TITLE_WEIGHT;
                        }
                        if body.contains(token.as_str()) {
                            s += BODY_WEIGHT;
                        }
                        s
                    })
                    .sum();

                (raw > 0.0)
                    .then(|| RetrievalMatch::from_document(doc, raw / max_score, Strategy::Keyword))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("title-hit", "Funding report", "Quarterly numbers"),
            Document::new("body-hit", "Quarterly review", "Seed funding slowed down"),
            Document::new("both", "Funding trends", "Funding concentrated in enterprise"),
            Document::new("none", "Weather", "Sunny"),
        ]
    }

    #[test]
    fn test_title_outweighs_body() {
        let results = KeywordStrategy::new().search("funding", &docs());
        let ids: Vec<&str> = results.iter().map(|m| m.document_id.as_str()).collect();
        assert_eq!(ids, vec!["both", "title-hit", "body-hit"]);

        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - 2.0 / 3.0).abs() < 1e-6);
        assert!((results[2].score - 1.0 / 3.0).abs() < 1e-6);
        assert!(results.iter().all(|m| m.strategy == Strategy::Keyword));
    }

    #[test]
    fn test_cjk_bigrams_match_paraphrase() {
        let docs = vec![Document::new("cn", "AI投资趋势分析", "全球AI创投市场呈现分化趋势")];
        let results = KeywordStrategy::new().search("最近的投资趋势如何", &docs);
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0 && results[0].score < 1.0);
    }

    #[test]
    fn test_no_tokens_no_matches() {
        assert!(KeywordStrategy::new().search("the a of", &docs()).is_empty());
        assert!(KeywordStrategy::new().search("funding", &[]).is_empty());
    }
}
