use std::sync::Arc;

use clap::Parser;
use tracing::info;
use wiki_rag::Result;
use wiki_rag::config::Config;
use wiki_rag::embeddings::EmbeddingClient;
use wiki_rag::milvus::MilvusClient;
use wiki_rag::rag::RagPipeline;
use wiki_rag::watsonx::WatsonxClient;
use wiki_rag::web::{self, AppState};

#[derive(Parser)]
#[command(name = "wiki-rag")]
#[command(about = "Retrieval-augmented question answering over a wiki article collection")]
#[command(version)]
struct Cli {
    /// Address to serve the web interface on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Environment file applied before reading configuration
    #[arg(long, default_value = "config.env")]
    env_file: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    dotenv::from_filename(&cli.env_file).ok();

    let mut config = Config::from_env()?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    let embedder = EmbeddingClient::new(&config.embedder)?;
    let store = MilvusClient::new(&config.milvus)?;
    store.load_collection()?;
    let generator = WatsonxClient::new(&config.watsonx)?;

    let pipeline = RagPipeline::new(embedder, store, generator);
    let state = Arc::new(AppState::new(Box::new(pipeline)));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!("Serving web interface on {}", config.server.bind_addr);
    axum::serve(listener, web::router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing_defaults() {
        let cli = Cli::try_parse_from(["wiki-rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.bind, None);
            assert_eq!(parsed.env_file, "config.env");
        }
    }

    #[test]
    fn cli_parsing_with_bind() {
        let cli = Cli::try_parse_from(["wiki-rag", "--bind", "0.0.0.0:9090"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.bind.as_deref(), Some("0.0.0.0:9090"));
        }
    }

    #[test]
    fn cli_parsing_with_env_file() {
        let cli = Cli::try_parse_from(["wiki-rag", "--env-file", "other.env"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.env_file, "other.env");
        }
    }
}
