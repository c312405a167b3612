//! API server for lumen

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::assistant::Assistant;
use crate::config::ServerSettings;

use super::routes::{
    cache_invalidate, cache_stats, chat, corpus_reload, health_check, route, search, AppState,
};

/// Configuration for the API server
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        ServerSettings::default().into()
    }
}

impl From<ServerSettings> for ApiServerConfig {
    fn from(settings: ServerSettings) -> Self {
        Self {
            host: settings.host,
            port: settings.port,
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    assistant: Assistant,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, assistant: Assistant) -> Self {
        Self { config, assistant }
    }

    /// Build the router
    pub fn router(assistant: Assistant) -> Router {
        let app_state = Arc::new(AppState { assistant });

        Router::new()
            .route("/health", get(health_check))
            .route("/api/chat", post(chat))
            .route("/api/search", get(search))
            .route("/api/route", get(route))
            .route("/api/cache/stats", get(cache_stats))
            .route("/api/cache/invalidate", post(cache_invalidate))
            .route("/api/corpus/reload", post(corpus_reload))
            .with_state(app_state)
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            "Starting API server on {} (generation backend: {})",
            listener.local_addr()?,
            self.assistant.backend_name()
        );

        let app = Self::router(self.assistant);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
