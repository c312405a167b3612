//! OpenAI-compatible chat-completions and embeddings client

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lumen_store::vector::Embedder;
use lumen_store::StoreError;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{boxed_tokens, GenerationBackend, GenerationRequest, TokenStream};
use crate::config::GenerationSettings;
use crate::error::{GenerationError, Result};

/// One parsed server-sent-events line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Token(String),
    Done,
    /// Comments, keep-alives, non-data fields and empty deltas
    Skip,
}

/// Parse one SSE line of a streaming chat completion.
///
/// Accepts the OpenAI delta shape (`choices[0].delta.content`) and the flat
/// `{"response": "..."}` shape some gateways emit.
pub fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();

    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| GenerationError::MalformedStream(format!("{}: {}", e, data)))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(GenerationError::Aborted(message));
    }

    let token = value["choices"][0]["delta"]["content"]
        .as_str()
        .or_else(|| value["response"].as_str());

    Ok(match token {
        Some(token) if !token.is_empty() => SseLine::Token(token.to_string()),
        _ => SseLine::Skip,
    })
}

/// Decode an SSE byte stream into tokens.
///
/// Lines are split on raw bytes so multi-byte characters straddling chunk
/// boundaries survive. Each read waits at most `idle`. A stream that closes
/// before `[DONE]` ends with an error.
pub fn sse_token_stream<S, B, E>(bytes: S, idle: Duration) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<GenerationError> + Send,
{
    let stream = try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while !finished {
            let next = tokio::time::timeout(idle, bytes.next())
                .await
                .map_err(|_| GenerationError::Timeout(idle))?;
            let chunk = match next {
                Some(chunk) => chunk.map_err(|e| -> GenerationError { e.into() })?,
                None => break,
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=end).collect();
                let line = String::from_utf8_lossy(&raw).to_string();
                match parse_sse_line(&line)? {
                    SseLine::Token(token) => yield token,
                    SseLine::Done => {
                        finished = true;
                        break;
                    }
                    SseLine::Skip => {}
                }
            }
        }

        if !finished {
            let rest = String::from_utf8_lossy(&buffer).to_string();
            match parse_sse_line(&rest)? {
                SseLine::Token(token) => yield token,
                SseLine::Done => {}
                SseLine::Skip => {
                    Err::<(), _>(GenerationError::Aborted(
                        "stream closed before completion".to_string(),
                    ))?;
                }
            }
        }
    };
    boxed_tokens(stream)
}

/// Streaming chat completions against any OpenAI-compatible endpoint.
///
/// Models are tried in order (requested model, then fallbacks); a model is
/// abandoned only when the request fails before streaming begins.
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    fallback_models: Vec<String>,
    timeout: Duration,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            fallback_models: Vec::new(),
            timeout,
        })
    }

    /// Build from settings; `None` when no base URL is configured
    pub fn from_settings(settings: &GenerationSettings) -> Result<Option<Self>> {
        let Some(base_url) = settings.base_url.as_deref() else {
            return Ok(None);
        };
        let backend = Self::new(
            base_url,
            settings.api_key.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )?
        .with_fallback_models(settings.fallback_models.clone());
        Ok(Some(backend))
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Requested model first, then fallbacks, without duplicates
    pub fn model_chain(&self, primary: &str) -> Vec<String> {
        let mut chain = vec![primary.to_string()];
        for model in &self.fallback_models {
            if !chain.contains(model) {
                chain.push(model.clone());
            }
        }
        chain
    }

    async fn open_stream(&self, model: &str, request: &GenerationRequest) -> Result<reqwest::Response> {
        let body = json!({
            "model": model,
            "messages": request.messages,
            "stream": true,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<TokenStream> {
        let chain = self.model_chain(&request.model);
        let mut last_error = String::new();

        for model in &chain {
            match self.open_stream(model, &request).await {
                Ok(response) => {
                    info!("Streaming completion from model {}", model);
                    return Ok(sse_token_stream(response.bytes_stream(), self.timeout));
                }
                Err(e) => {
                    warn!("Model {} failed, trying next: {}", model, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(GenerationError::Unavailable {
            attempted: chain.len(),
            last_error,
        })
    }
}

/// Embeddings over an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimensions,
            max_retries: 2,
        })
    }

    /// Build from settings; `None` unless both a base URL and an embedding
    /// model are configured
    pub fn from_settings(settings: &GenerationSettings) -> Result<Option<Self>> {
        match (&settings.base_url, &settings.embedding_model) {
            (Some(base_url), Some(model)) => Ok(Some(Self::new(
                base_url.clone(),
                settings.api_key.clone(),
                model.clone(),
                settings.embedding_dimensions,
                Duration::from_secs(settings.request_timeout_secs),
            )?)),
            _ => Ok(None),
        }
    }
}

fn parse_embedding(json: &serde_json::Value) -> lumen_store::Result<Vec<f32>> {
    let embedding = json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| StoreError::Serialization("missing data[0].embedding".to_string()))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> lumen_store::Result<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 200ms, 400ms, ...
                let delay = Duration::from_millis(200 << (attempt - 1).min(4));
                tokio::time::sleep(delay).await;
            }

            let mut builder = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let embedding = parse_embedding(&json)?;
                if embedding.len() != self.dimensions {
                    return Err(StoreError::DimensionMismatch {
                        expected: self.dimensions,
                        actual: embedding.len(),
                    });
                }
                return Ok(embedding);
            }

            let text = response.text().await.unwrap_or_default();
            last_error = format!("HTTP {}: {}", status, text);
            if status.as_u16() != 429 && !status.is_server_error() {
                break;
            }
            debug!("Retrying embedding request after {}", status);
        }

        Err(StoreError::Backend(format!("embedding failed: {}", last_error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = std::result::Result<Vec<u8>, GenerationError>> {
        stream::iter(parts.into_iter().map(Ok))
    }

    #[test]
    fn test_parse_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Token("Hel".to_string()));
    }

    #[test]
    fn test_parse_gateway_response_shape() {
        let line = r#"data: {"response":"你好"}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Token("你好".to_string()));
    }

    #[test]
    fn test_parse_control_lines() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("event: ping").unwrap(), SseLine::Skip);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), SseLine::Skip);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(GenerationError::MalformedStream(_))
        ));
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            Err(GenerationError::Aborted(m)) if m == "overloaded"
        ));
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_lines_and_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"投资\"}}]}\n".as_bytes();
        // split inside the multi-byte character
        let cut = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let (head, tail) = line.split_at(cut);

        let parts = vec![
            head.to_vec(),
            tail.to_vec(),
            b"data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n".to_vec(),
            b"data: [DONE]\n".to_vec(),
        ];

        let tokens: Vec<String> = sse_token_stream(chunks(parts), Duration::from_secs(1))
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["投资".to_string(), "!".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_without_done_is_an_error() {
        let parts = vec![b"data: {\"response\":\"partial\"}\n".to_vec()];
        let items: Vec<Result<String>> = sse_token_stream(chunks(parts), Duration::from_secs(1))
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(items[1], Err(GenerationError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_idle_stream_times_out() {
        let pending = stream::pending::<std::result::Result<Vec<u8>, GenerationError>>();
        let items: Vec<Result<String>> = sse_token_stream(pending, Duration::from_millis(20))
            .collect()
            .await;
        assert!(matches!(items.as_slice(), [Err(GenerationError::Timeout(_))]));
    }

    #[test]
    fn test_model_chain_dedups() {
        let backend = OpenAiCompatibleBackend::new("http://localhost:1/v1/", None, Duration::from_secs(1))
            .unwrap()
            .with_fallback_models(vec!["big".to_string(), "small".to_string()]);
        assert_eq!(backend.model_chain("small"), vec!["small", "big"]);
        assert_eq!(backend.base_url, "http://localhost:1/v1");
    }

    #[test]
    fn test_parse_embedding() {
        let json = serde_json::json!({"data": [{"embedding": [0.5, -0.25]}]});
        assert_eq!(parse_embedding(&json).unwrap(), vec![0.5, -0.25]);
        assert!(parse_embedding(&serde_json::json!({})).is_err());
    }
}
