
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::EmbedderConfig;
use crate::rag::Embed;
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Client for the embedding inference server.
///
/// The model is fixed at construction; `embed` is a pure function of its input
/// from the caller's perspective, deterministic for a given model version.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Convert one text into its fixed-length embedding vector.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| RagError::Embedding(format!("Failed to build embedding URL: {e}")))?;

        let request = EmbedRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to serialize embedding request: {e}")))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| request_error("Embedding request failed", &e))?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse embedding response: {e}")))?;

        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Embedding response contained no vectors".to_string()))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

impl Embed for EmbeddingClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        EmbeddingClient::embed(self, text)
    }
}

fn request_error(action: &str, error: &ureq::Error) -> RagError {
    match error {
        ureq::Error::StatusCode(status) => RagError::Embedding(format!("{action}: HTTP {status}")),
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => RagError::Connection(format!("{action}: {error}")),
        _ => RagError::Embedding(format!("{action}: {error}")),
    }
}
