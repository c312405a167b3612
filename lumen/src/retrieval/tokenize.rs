//! Language-aware query tokenization
//!
//! Latin-script text splits on whitespace and punctuation. A contiguous CJK
//! run yields the whole run plus its overlapping bigrams, since CJK text has
//! no word separators.

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "what", "how", "why", "who", "which", "does", "do",
    "的", "了", "在", "是", "我", "你", "他", "她", "这", "那", "一个", "我们", "什么", "怎么",
    "为什么", "如何", "哪里", "谁", "当", "如果", "吗", "呢",
];

pub use lumen_store::vector::is_cjk;

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

#[derive(Clone, Copy, PartialEq)]
enum Script {
    Latin,
    Cjk,
}

/// Split into lowercase runs of one script; everything else separates runs
fn runs(text: &str) -> Vec<(Script, String)> {
    let mut runs: Vec<(Script, String)> = Vec::new();
    let mut current: Option<(Script, String)> = None;

    for c in text.chars().flat_map(char::to_lowercase) {
        let script = if is_cjk(c) {
            Some(Script::Cjk)
        } else if c.is_alphanumeric() || c == '_' {
            Some(Script::Latin)
        } else {
            None
        };

        match (script, current.as_mut()) {
            (Some(s), Some((cs, run))) if *cs == s => run.push(c),
            (Some(s), _) => {
                if let Some(done) = current.take() {
                    runs.push(done);
                }
                current = Some((s, c.to_string()));
            }
            (None, _) => {
                if let Some(done) = current.take() {
                    runs.push(done);
                }
            }
        }
    }
    if let Some(done) = current {
        runs.push(done);
    }
    runs
}

/// Tokenize for retrieval: lowercase, stop words removed, single characters
/// dropped, duplicates removed (first occurrence order kept).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut push = |token: String| {
        if token.chars().count() > 1 && !is_stopword(&token) && !tokens.contains(&token) {
            tokens.push(token);
        }
    };

    for (script, run) in runs(text) {
        match script {
            Script::Latin => push(run),
            Script::Cjk => {
                let chars: Vec<char> = run.chars().collect();
                if chars.len() > 2 {
                    for pair in chars.windows(2) {
                        push(pair.iter().collect());
                    }
                }
                push(run);
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_split_and_stopwords() {
        assert_eq!(
            tokenize("What is the Series-A funding trend?"),
            vec!["series", "funding", "trend"]
        );
    }

    #[test]
    fn test_cjk_run_yields_bigrams_and_whole_run() {
        assert_eq!(tokenize("投资趋势"), vec!["投资", "资趋", "趋势", "投资趋势"]);
        assert_eq!(tokenize("融资"), vec!["融资"]);
    }

    #[test]
    fn test_mixed_scripts_split_at_boundary() {
        assert_eq!(tokenize("AI投资 2024年"), vec!["ai", "投资", "2024"]);
    }

    #[test]
    fn test_stopword_bigrams_removed() {
        // "什么" is a stop word; the remaining bigrams survive
        let tokens = tokenize("什么是估值");
        assert!(!tokens.contains(&"什么".to_string()));
        assert!(tokens.contains(&"估值".to_string()));
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("?!，。").is_empty());
    }

    #[test]
    fn test_is_cjk() {
        assert!(is_cjk('投'));
        assert!(is_cjk('カ'));
        assert!(!is_cjk('a'));
        assert!(is_cjk('\u{F900}'));
        assert!(contains_cjk("AI投资"));
        assert!(!contains_cjk("funding"));
    }
}
