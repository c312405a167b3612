//! Generation backends
//!
//! A backend turns a chat request into an asynchronous sequence of text
//! tokens. Errors before the first token (connection refused, HTTP error)
//! are returned from [`GenerationBackend::generate`]; errors after streaming
//! has begun arrive as `Err` items of the [`TokenStream`].

mod extractive;
mod openai;

pub use extractive::ExtractiveBackend;
pub use openai::{parse_sse_line, OpenAiCompatibleBackend, OpenAiEmbedder, SseLine};

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Text tokens as they are produced
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

pub fn boxed_tokens<S>(stream: S) -> TokenStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(stream)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    /// System prompt first, then the conversation
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 2048,
            temperature: 0.3,
            top_p: 0.9,
        }
    }

    /// Content of the leading system message, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Content of the last user message, if any
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Token-producing generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<TokenStream>;
}
