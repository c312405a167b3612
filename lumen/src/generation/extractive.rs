//! Offline backend that answers from the prompt's knowledge context

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use super::{GenerationBackend, GenerationRequest, TokenStream};
use crate::error::Result;
use crate::prompt::{CONTEXT_HEADER, QUESTION_HEADER};

/// Characters of each entry quoted in the answer
const SUMMARY_CHARS: usize = 160;

/// Longest token emitted for text without whitespace (CJK)
const MAX_TOKEN_CHARS: usize = 8;

/// Streams a summary of the knowledge entries found in the system prompt.
///
/// Used when no generation endpoint is configured, so the full pipeline
/// (routing, retrieval, synthesis, caching) runs without network access.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveBackend {
    token_delay: Duration,
}

impl ExtractiveBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between tokens, to mimic a remote model
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Compose the full answer text for a request
    pub fn compose(&self, request: &GenerationRequest) -> String {
        let system = request.system_prompt().unwrap_or_default();
        let question = request
            .last_user_message()
            .map(str::to_string)
            .or_else(|| section_after(system, QUESTION_HEADER))
            .unwrap_or_default();
        let entries = context_entries(system);

        if entries.is_empty() {
            return format!(
                "The knowledge base has no entries covering \"{}\".\n\
                 Try rephrasing the question or asking about investment, startups or market trends.",
                question.trim()
            );
        }

        let mut answer = format!(
            "Based on {} knowledge base entr{}:\n\n",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" }
        );
        for (title, content) in &entries {
            answer.push_str(&format!("• **{}**: {}\n", title, summarize(content)));
        }
        answer
    }
}

#[async_trait]
impl GenerationBackend for ExtractiveBackend {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<TokenStream> {
        let tokens = split_tokens(&self.compose(&request));
        let delay = self.token_delay;

        let stream = stream::iter(tokens).then(move |token| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(token)
        });
        Ok(Box::pin(stream))
    }
}

/// Text of the first line following `header`
fn section_after(text: &str, header: &str) -> Option<String> {
    let start = text.find(header)? + header.len();
    text[start..]
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// `(title, content)` pairs of the numbered `N. **title**` entries in the
/// context section
fn context_entries(system: &str) -> Vec<(String, String)> {
    let Some(start) = system.find(CONTEXT_HEADER) else {
        return Vec::new();
    };
    let section = &system[start..];
    let section = match section.find(QUESTION_HEADER) {
        Some(end) => &section[..end],
        None => section,
    };

    let mut entries: Vec<(String, String)> = Vec::new();
    for line in section.lines().skip(1) {
        let line = line.trim();
        if let Some(title) = entry_title(line) {
            entries.push((title.to_string(), String::new()));
        } else if let Some((_, content)) = entries.last_mut() {
            if !line.is_empty() {
                if !content.is_empty() {
                    content.push(' ');
                }
                content.push_str(line);
            }
        }
    }
    entries
}

fn entry_title(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once(". ")?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.strip_prefix("**")?.strip_suffix("**")
}

/// Leading sentence(s) of `content`, at most `SUMMARY_CHARS` characters
fn summarize(content: &str) -> String {
    let mut summary = String::new();
    for (count, c) in content.chars().enumerate() {
        if count >= SUMMARY_CHARS {
            summary.push_str("...");
            break;
        }
        summary.push(c);
        if matches!(c, '。' | '！' | '？') && count > SUMMARY_CHARS / 2 {
            break;
        }
    }
    summary
}

/// Split text into small tokens that concatenate back to the input
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if c.is_whitespace() || current.chars().count() >= MAX_TOKEN_CHARS {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ChatMessage;

    const SYSTEM: &str = "Base prompt\n\n## Knowledge base context (2 matches, intent: funding)\n\
        1. **AI投资趋势分析**\n资金流向：B2B AI解决方案获得60%的投资份额。\n\n\
        2. **Seed rounds**\nSeed rounds slowed.\nSecond line.\n\n\
        ## Question\nwhat about funding\n\nAnswer from the knowledge above where it applies.";

    fn request(system: &str, user: &str) -> GenerationRequest {
        GenerationRequest::new(
            "offline",
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
    }

    #[test]
    fn test_context_entries_are_parsed() {
        let entries = context_entries(SYSTEM);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "AI投资趋势分析");
        assert_eq!(entries[1].1, "Seed rounds slowed. Second line.");
    }

    #[test]
    fn test_compose_with_and_without_context() {
        let backend = ExtractiveBackend::new();
        let answer = backend.compose(&request(SYSTEM, "what about funding"));
        assert!(answer.starts_with("Based on 2 knowledge base entries"));
        assert!(answer.contains("• **Seed rounds**: Seed rounds slowed. Second line."));

        let answer = backend.compose(&request("Base prompt", "unknown topic"));
        assert!(answer.contains("\"unknown topic\""));
    }

    #[test]
    fn test_split_tokens_round_trip() {
        let text = "Based on data:\n• 资金流向：B2B AI解决方案获得60%的投资份额";
        let tokens = split_tokens(text);
        assert!(tokens.len() > 3);
        assert!(tokens.iter().all(|t| t.chars().count() <= MAX_TOKEN_CHARS));
        assert_eq!(tokens.concat(), text);
    }

    #[tokio::test]
    async fn test_generate_streams_the_composed_answer() {
        let backend = ExtractiveBackend::new();
        let req = request(SYSTEM, "what about funding");
        let expected = backend.compose(&req);

        let tokens: Vec<String> = backend
            .generate(req)
            .await
            .unwrap()
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens.concat(), expected);
    }
}
