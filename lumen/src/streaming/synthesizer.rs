//! Token stream to chunk stream synthesis

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tracing::{debug, error};

use super::chunk::{ChunkPayload, SourceRef, SourcesPayload, StreamChunk, ThinkingStep};
use crate::config::StreamingSettings;
use crate::error::SynthesisError;
use crate::generation::TokenStream;
use crate::retrieval::RetrievalContext;

/// Chunks as they are synthesized; an `Err` item is terminal
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, SynthesisError>> + Send>>;

pub fn boxed_chunks<S>(stream: S) -> ChunkStream
where
    S: Stream<Item = Result<StreamChunk, SynthesisError>> + Send + 'static,
{
    Box::pin(stream)
}

const ANALYSIS_MARKERS: &[&str] = &["分析", "如何", "为什么", "why", "how", "analy"];

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Pause after each thinking chunk
    pub thinking_delay: Duration,
    /// Matches listed in the sources chunk
    pub sources_limit: usize,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            thinking_delay: Duration::from_millis(250),
            sources_limit: 3,
        }
    }
}

impl From<&StreamingSettings> for SynthesizerConfig {
    fn from(settings: &StreamingSettings) -> Self {
        Self {
            thinking_delay: Duration::from_millis(settings.thinking_delay_ms),
            sources_limit: settings.sources_limit,
        }
    }
}

/// Turns generation output plus retrieval metadata into ordered chunks:
/// thinking, then content, then at most one sources chunk.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    config: SynthesizerConfig,
}

impl Synthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SynthesizerConfig {
        &self.config
    }

    /// Wrap `tokens` into a chunk stream.
    ///
    /// Dropping the returned stream drops `tokens` with it. A token error is
    /// forwarded as the final item after any buffered text is flushed.
    pub fn synthesize(
        &self,
        tokens: TokenStream,
        context: Arc<RetrievalContext>,
        query: &str,
    ) -> ChunkStream {
        let steps = thinking_steps(query, &context);
        let delay = self.config.thinking_delay;
        let sources_limit = self.config.sources_limit;

        let stream = try_stream! {
            for (step, message, progress) in steps {
                yield StreamChunk::thinking(step, message, progress);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            let mut tokens = tokens;
            let mut lines = LineBuffer::default();
            let mut answer = String::new();
            let mut emitted = 0usize;

            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        answer.push_str(&token);
                        for unit in lines.push(&token) {
                            emitted += 1;
                            yield StreamChunk::content(unit, content_confidence(&answer));
                        }
                    }
                    Err(e) => {
                        error!("Generation failed after {} content chunk(s): {}", emitted, e);
                        if let Some(tail) = lines.finish() {
                            yield StreamChunk::content(tail, content_confidence(&answer));
                        }
                        Err::<(), SynthesisError>(e.into())?;
                    }
                }
            }

            if let Some(tail) = lines.finish() {
                emitted += 1;
                yield StreamChunk::content(tail, content_confidence(&answer));
            }
            if emitted == 0 {
                yield StreamChunk::content(String::new(), content_confidence(&answer));
            }

            if !context.is_empty() {
                yield sources_chunk(&context, sources_limit, content_confidence(&answer));
            }
            debug!(
                "Synthesized answer of {} chars for '{}'",
                answer.chars().count(),
                context.query
            );
        };
        boxed_chunks(stream)
    }
}

/// Thinking steps for a query, with increasing progress
fn thinking_steps(query: &str, context: &RetrievalContext) -> Vec<(ThinkingStep, String, f32)> {
    let mut steps = vec![(
        ThinkingStep::Understanding,
        "Understanding the question".to_string(),
        0.2,
    )];

    if !context.is_empty() {
        steps.push((
            ThinkingStep::Retrieved,
            format!("Found {} relevant knowledge entries", context.len()),
            0.5,
        ));
    }

    let lowered = query.to_lowercase();
    if ANALYSIS_MARKERS.iter().any(|m| lowered.contains(m)) {
        steps.push((
            ThinkingStep::Analyzing,
            "Analyzing the question in depth".to_string(),
            0.8,
        ));
    }

    steps.push((ThinkingStep::Generating, "Composing the answer".to_string(), 1.0));
    steps
}

fn sources_chunk(context: &RetrievalContext, limit: usize, confidence: f32) -> StreamChunk {
    StreamChunk::new(
        ChunkPayload::Sources(SourcesPayload {
            sources: context.matches.iter().take(limit).map(SourceRef::from).collect(),
            total_matches: context.len(),
            search_time_ms: context.elapsed_ms,
        }),
        confidence,
        1.0,
    )
}

/// Presentation heuristic over the answer text so far: longer, structured
/// and numeric text scores higher. Unrelated to retrieval scores.
pub fn content_confidence(text: &str) -> f32 {
    let chars = text.chars().count();
    let mut confidence: f32 = 0.7;

    if chars > 100 {
        confidence += 0.1;
    }
    if chars > 300 {
        confidence += 0.1;
    }
    if text.contains('•') || text.contains("**") {
        confidence += 0.05;
    }
    if text.contains("数据") || text.contains("分析") {
        confidence += 0.05;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        confidence += 0.05;
    }
    confidence.min(1.0)
}

/// Splits incoming text into complete lines, newline included
#[derive(Debug, Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut units = Vec::new();
        while let Some(end) = self.pending.find('\n') {
            units.push(self.pending.drain(..=end).collect());
        }
        units
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::error::GenerationError;
    use crate::generation::boxed_tokens;
    use crate::retrieval::{RetrievalMatch, Strategy};
    use crate::streaming::ChunkKind;
    use futures::stream;

    fn tokens(parts: &[&str]) -> TokenStream {
        let parts: Vec<crate::error::Result<String>> = parts.iter().map(|p| Ok(p.to_string())).collect();
        boxed_tokens(stream::iter(parts))
    }

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(SynthesizerConfig {
            thinking_delay: Duration::ZERO,
            sources_limit: 3,
        })
    }

    fn context(n: usize) -> Arc<RetrievalContext> {
        let matches = (0..n)
            .map(|i| {
                let doc = Document::new(format!("d{i}"), format!("Doc {i}"), "body");
                RetrievalMatch::from_document(&doc, 0.9 - i as f32 * 0.1, Strategy::Keyword)
            })
            .collect();
        Arc::new(RetrievalContext::new("q", matches, 7))
    }

    #[test]
    fn test_line_buffer() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push("ab").is_empty());
        assert_eq!(buffer.push("c\nde\nf"), vec!["abc\n", "de\n"]);
        assert_eq!(buffer.finish().as_deref(), Some("f"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_content_confidence() {
        assert!((content_confidence("short") - 0.7).abs() < 1e-6);
        let structured = format!("• **数据** 2025 {}", "x".repeat(400));
        assert!((content_confidence(&structured) - 1.0).abs() < 1e-6);
        assert!(content_confidence(&"x".repeat(150)) > content_confidence("x"));
    }

    #[test]
    fn test_thinking_steps() {
        let steps = thinking_steps("为什么AI投资增长", &context(2));
        let kinds: Vec<ThinkingStep> = steps.iter().map(|s| s.0).collect();
        assert_eq!(
            kinds,
            vec![
                ThinkingStep::Understanding,
                ThinkingStep::Retrieved,
                ThinkingStep::Analyzing,
                ThinkingStep::Generating
            ]
        );
        assert!(steps.windows(2).all(|w| w[0].2 < w[1].2));

        let steps = thinking_steps("hello", &RetrievalContext::empty("hello"));
        assert_eq!(steps.len(), 2);
    }

    #[tokio::test]
    async fn test_content_concatenates_to_answer() {
        let chunks: Vec<StreamChunk> = synthesizer()
            .synthesize(tokens(&["Line one", "\nLine ", "two\nend"]), context(0), "q")
            .map(|c| c.unwrap())
            .collect()
            .await;

        let text: String = chunks.iter().filter_map(|c| c.text()).collect();
        assert_eq!(text, "Line one\nLine two\nend");
        assert_eq!(
            chunks.iter().filter(|c| c.kind() == ChunkKind::Content).count(),
            3
        );
        assert!(chunks.iter().all(|c| c.kind() != ChunkKind::Sources));
    }

    #[tokio::test]
    async fn test_sources_are_limited() {
        let chunks: Vec<StreamChunk> = synthesizer()
            .synthesize(tokens(&["answer"]), context(5), "q")
            .map(|c| c.unwrap())
            .collect()
            .await;

        let last = chunks.last().unwrap();
        match &last.payload {
            ChunkPayload::Sources(sources) => {
                assert_eq!(sources.sources.len(), 3);
                assert_eq!(sources.total_matches, 5);
                assert_eq!(sources.search_time_ms, 7);
                assert_eq!(sources.sources[0].document_id, "d0");
            }
            other => panic!("expected sources, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_generation_still_emits_content() {
        let chunks: Vec<StreamChunk> = synthesizer()
            .synthesize(tokens(&[]), context(0), "q")
            .map(|c| c.unwrap())
            .collect()
            .await;

        let content: Vec<&StreamChunk> = chunks.iter().filter(|c| c.kind() == ChunkKind::Content).collect();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].text(), Some(""));
    }

    #[tokio::test]
    async fn test_error_flushes_then_terminates() {
        let items: Vec<crate::error::Result<String>> = vec![
            Ok("partial ".to_string()),
            Ok("text".to_string()),
            Err(GenerationError::Aborted("connection reset".to_string())),
            Ok("never".to_string()),
        ];
        let results: Vec<Result<StreamChunk, SynthesisError>> = synthesizer()
            .synthesize(boxed_tokens(stream::iter(items)), context(2), "q")
            .collect()
            .await;

        let last = results.last().unwrap();
        assert!(matches!(last, Err(SynthesisError::Generation(GenerationError::Aborted(_)))));

        let text: String = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter_map(|c| c.text())
            .collect();
        assert_eq!(text, "partial text");
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .all(|c| c.kind() != ChunkKind::Sources));
    }
}
