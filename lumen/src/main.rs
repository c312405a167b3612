use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::Result;
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lumen::api::{ApiServer, ApiServerConfig};
use lumen::router::ModelTable;
use lumen::{AppConfig, Assistant, ChunkPayload, QueryRouter};

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Knowledge assistant with tiered caching and streamed answers", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Answer a question and print the chunk stream
    Ask {
        query: String,

        /// Print raw wire frames instead of text
        #[arg(long)]
        raw: bool,
    },

    /// Run hybrid retrieval only
    Search {
        query: String,

        /// Maximum number of matches
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show how a query would be routed
    Route {
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lumen=info,lumen_store=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let assistant = Assistant::from_config(&config).await?;
            let server = ApiServer::new(ApiServerConfig::from(config.server.clone()), assistant);
            println!("Starting API server on {}:{}", config.server.host, config.server.port);
            server.start().await?;
        }

        Commands::Ask { ref query, raw } => {
            let assistant = Assistant::from_config(&config).await?;
            let mut chunks = assistant.answer(query);

            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        println!();
                        return Err(e.into());
                    }
                };
                if raw {
                    println!("{}", chunk.to_frame()?);
                    continue;
                }
                match &chunk.payload {
                    ChunkPayload::Metadata(meta) => {
                        println!(
                            "[{} | intent {} | model {} | cache {:?}]",
                            meta.complexity, meta.intent, meta.model, meta.cache
                        );
                    }
                    ChunkPayload::Thinking(thinking) => {
                        println!("… {} ({:.0}%)", thinking.message, chunk.progress * 100.0);
                    }
                    ChunkPayload::Content(content) => print!("{}", content.text),
                    ChunkPayload::Sources(sources) => {
                        println!("\n\nSources ({} matches, {}ms):", sources.total_matches, sources.search_time_ms);
                        for source in &sources.sources {
                            println!("  - {} [{}] {:.2}", source.title, source.source_tag, source.score);
                        }
                    }
                }
            }
            println!();
        }

        Commands::Search { ref query, limit } => {
            let assistant = Assistant::from_config(&config).await?;
            let limit = limit.unwrap_or(config.retrieval.top_k);
            let context = assistant.retriever().retrieve(query, limit).await;

            if context.is_empty() {
                println!("No matches found.");
            } else {
                println!(
                    "{} matches in {}ms (confidence {:.2}):",
                    context.len(),
                    context.elapsed_ms,
                    context.aggregate_confidence
                );
                for (i, m) in context.matches.iter().enumerate() {
                    let strategies: Vec<&str> = m.corroborated_by.iter().map(|s| s.as_str()).collect();
                    println!(
                        "{}. {} ({:.3}) [{}] via {}",
                        i + 1,
                        m.title,
                        m.score,
                        m.source_tag,
                        strategies.join("+")
                    );
                }
            }
        }

        Commands::Route { ref query } => {
            let router = QueryRouter::new(config.router.clone(), ModelTable::from(&config.generation));
            let decision = router.classify(query);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
    }

    Ok(())
}
