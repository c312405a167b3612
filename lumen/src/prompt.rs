//! Prompt assembly from routing and retrieval output

use crate::generation::ChatMessage;
use crate::retrieval::RetrievalContext;
use crate::router::{Intent, RouteDecision};

pub const BASE_SYSTEM_PROMPT: &str = "You are a research assistant for an AI venture and \
startup knowledge base. Answer accurately and concisely, cite figures from the supplied \
knowledge when available, and say so plainly when the knowledge base does not cover a question. \
Answer in the language of the question.";

/// Section header preceding knowledge entries
pub const CONTEXT_HEADER: &str = "## Knowledge base context";

/// Section header preceding the question
pub const QUESTION_HEADER: &str = "## Question";

/// Entries injected into the prompt
const MAX_CONTEXT_ENTRIES: usize = 5;

/// Characters of each entry's content kept in the prompt
const MAX_ENTRY_CHARS: usize = 800;

/// Build the system prompt for one query
pub fn build_system_prompt(decision: &RouteDecision, context: &RetrievalContext) -> String {
    let mut prompt = String::from(BASE_SYSTEM_PROMPT);

    if decision.intent == Intent::Contact {
        prompt.push_str(&format!(
            "\n\n{}\n{}\n\nThis request asks for introductions or advisory services. Answer \
             briefly and suggest the user contact the team directly for one-on-one follow-up.",
            QUESTION_HEADER, decision.expansion
        ));
        return prompt;
    }

    if context.is_empty() {
        prompt.push_str(&format!(
            "\n\n{}\n{}\n\nNo knowledge base entries matched; answer from general knowledge.",
            QUESTION_HEADER, decision.expansion
        ));
        return prompt;
    }

    let entries = select_entries(context, &decision.keywords);
    prompt.push_str(&format!(
        "\n\n{} ({} matches, intent: {})\n",
        CONTEXT_HEADER,
        entries.len(),
        decision.intent
    ));
    for (i, (title, content)) in entries.iter().enumerate() {
        prompt.push_str(&format!("{}. **{}**\n{}\n\n", i + 1, title, content));
    }
    prompt.push_str(&format!(
        "{}\n{}\n\nAnswer from the knowledge above where it applies.",
        QUESTION_HEADER, decision.expansion
    ));
    prompt
}

/// Order matches by how many intent keywords their content contains, then
/// by retrieval score; keep the best few, truncated
fn select_entries(context: &RetrievalContext, keywords: &[String]) -> Vec<(String, String)> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut ranked: Vec<(usize, f32, &str, &str)> = context
        .matches
        .iter()
        .map(|m| {
            let body = m.content.to_lowercase();
            let hits = keywords.iter().filter(|k| body.contains(k.as_str())).count();
            (hits, m.score, m.title.as_str(), m.content.as_str())
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
    });

    ranked
        .into_iter()
        .take(MAX_CONTEXT_ENTRIES)
        .map(|(_, _, title, content)| (title.to_string(), truncate_chars(content, MAX_ENTRY_CHARS)))
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}

/// System prompt followed by the most recent `history_limit` conversation
/// messages
pub fn build_messages(
    system_prompt: String,
    conversation: &[ChatMessage],
    history_limit: usize,
) -> Vec<ChatMessage> {
    let skip = conversation.len().saturating_sub(history_limit.max(1));
    std::iter::once(ChatMessage::system(system_prompt))
        .chain(conversation[skip..].iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::retrieval::{RetrievalMatch, Strategy};
    use crate::router::QueryRouter;

    fn context(docs: &[(&str, &str, f32)]) -> RetrievalContext {
        let matches = docs
            .iter()
            .map(|(id, content, score)| {
                RetrievalMatch::from_document(&Document::new(*id, *id, *content), *score, Strategy::Keyword)
            })
            .collect();
        RetrievalContext::new("q", matches, 1)
    }

    #[test]
    fn test_prompt_includes_ranked_context() {
        let decision = QueryRouter::default().classify("最新融资情况");
        let ctx = context(&[
            ("plain", "unrelated text", 0.9),
            ("funding", "融资 and 投资 figures for 2025", 0.4),
        ]);

        let prompt = build_system_prompt(&decision, &ctx);
        assert!(prompt.contains(CONTEXT_HEADER));
        assert!(prompt.contains(QUESTION_HEADER));
        // keyword hits outrank retrieval score
        assert!(prompt.find("**funding**").unwrap() < prompt.find("**plain**").unwrap());
        assert!(prompt.contains(&decision.expansion));
    }

    #[test]
    fn test_prompt_without_context() {
        let decision = QueryRouter::default().classify("hello");
        let prompt = build_system_prompt(&decision, &RetrievalContext::empty("hello"));
        assert!(!prompt.contains(CONTEXT_HEADER));
        assert!(prompt.contains("No knowledge base entries matched"));
    }

    #[test]
    fn test_long_content_is_truncated() {
        let long = "x".repeat(1000);
        assert_eq!(truncate_chars(&long, 800).chars().count(), 803);
        assert_eq!(truncate_chars("short", 800), "short");
    }

    #[test]
    fn test_history_is_limited() {
        let conversation: Vec<ChatMessage> = (0..5).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let messages = build_messages("sys".to_string(), &conversation, 3);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "sys");
        assert_eq!(messages[1].content, "m2");
        assert_eq!(messages[3].content, "m4");
    }
}
