//! API routes for the lumen server

use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::StreamExt;
use lumen_store::CacheStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::assistant::Assistant;
use crate::error::SynthesisError;
use crate::generation::ChatMessage;
use crate::streaming::{error_frame, ChunkStream, DONE_SENTINEL};

/// Application state
pub struct AppState {
    pub assistant: Assistant,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Chat request: a conversation, or a single query
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub query: Option<String>,
}

/// Search query parameters
#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct RouteQuery {
    pub query: String,
}

#[derive(Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

/// Invalidate one key or every entry carrying a tag
#[derive(Deserialize)]
pub struct InvalidateRequest {
    pub key: Option<String>,
    pub tag: Option<String>,
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub documents: usize,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Answer as server-sent events: one frame per chunk, an error frame on
/// failure, then `[DONE]`
pub async fn chat(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversation = match payload.query {
        Some(query) if !query.trim().is_empty() => vec![ChatMessage::user(query)],
        _ if payload.messages.iter().any(|m| !m.content.trim().is_empty()) => payload.messages,
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    let chunks = app_state.assistant.answer_conversation(conversation);
    Ok(Sse::new(sse_frames(chunks)).keep_alive(KeepAlive::default()))
}

fn sse_frames(
    chunks: ChunkStream,
) -> impl futures::Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream! {
        let mut chunks = chunks;
        while let Some(item) = chunks.next().await {
            let frame = item.and_then(|chunk| chunk.to_frame().map_err(SynthesisError::from));
            match frame {
                Ok(frame) => yield Ok(Event::default().data(frame)),
                Err(e) => {
                    error!("Answer stream failed: {}", e);
                    yield Ok(Event::default().data(error_frame(&e)));
                    break;
                }
            }
        }
        yield Ok(Event::default().data(DONE_SENTINEL));
    }
}

/// Hybrid retrieval without generation
pub async fn search(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if params.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let retriever = app_state.assistant.retriever();
    let limit = params.limit.unwrap_or(retriever.config().default_top_k);
    let context = retriever.retrieve(&params.query, limit).await;
    Ok(Json(context))
}

/// Routing decision for a query
pub async fn route(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<RouteQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if params.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(app_state.assistant.router().classify(&params.query)))
}

pub async fn cache_stats(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = app_state.assistant.cache().stats().await;
    let hit_rate = stats.hit_rate();
    Json(CacheStatsResponse { stats, hit_rate })
}

pub async fn cache_invalidate(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<InvalidateRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let cache = app_state.assistant.cache();
    let invalidated = match (payload.key, payload.tag) {
        (Some(key), _) => usize::from(cache.invalidate(&key).await),
        (None, Some(tag)) => cache.invalidate_by_tag(&tag).await.count(),
        (None, None) => return Err(StatusCode::BAD_REQUEST),
    };
    info!("Invalidated {} cache entries via API", invalidated);
    Ok(Json(InvalidateResponse { invalidated }))
}

pub async fn corpus_reload(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let documents = app_state.assistant.reload_corpus().await.map_err(|e| {
        error!("Corpus reload failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(ReloadResponse { documents }))
}
