#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::{COLLECTION_NAME, MilvusConfig, NPROBE, TEXT_FIELD, VECTOR_FIELD};
use crate::rag::{ScoredPassage, SearchPassages};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
const LOAD_PATH: &str = "/v2/vectordb/collections/load";
const SEARCH_PATH: &str = "/v2/vectordb/entities/search";

/// Client for the remote Milvus collection.
///
/// One authenticated connection is opened at startup and held for the process
/// lifetime; the collection must be loaded before it is searchable.
#[derive(Debug, Clone)]
pub struct MilvusClient {
    base_url: Url,
    auth_token: String,
    collection: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadCollectionRequest<'a> {
    collection_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    data: Vec<&'a [f32]>,
    anns_field: &'a str,
    limit: usize,
    output_fields: [&'a str; 1],
    search_params: SearchParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    metric_type: &'static str,
    params: NprobeParams,
}

#[derive(Debug, Serialize)]
struct NprobeParams {
    nprobe: u32,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    distance: f32,
    #[serde(rename = "article_text")]
    text: String,
}

impl MilvusClient {
    /// Open the connection described by `config`.
    ///
    /// If the server certificate file is present it becomes the sole trusted
    /// root for the connection, matching the private CA the collection is
    /// served behind. Otherwise platform roots apply.
    #[inline]
    pub fn new(config: &MilvusConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let mut builder = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)));

        if config.cert_path.exists() {
            debug!("Trusting server certificate from {}", config.cert_path.display());
            builder = builder.tls_config(tls_with_root(&config.cert_path)?);
        }

        let agent: ureq::Agent = builder.build().into();

        Ok(Self {
            base_url,
            auth_token: format!("{}:{}", config.username, config.password),
            collection: COLLECTION_NAME.to_string(),
            agent,
        })
    }

    /// Load the collection into memory so it is searchable.
    ///
    /// A failure here aborts startup; there is no lazy or partial load.
    #[inline]
    pub fn load_collection(&self) -> Result<()> {
        info!("Loading collection {}", self.collection);

        let request = LoadCollectionRequest {
            collection_name: &self.collection,
        };
        let url = self.endpoint(LOAD_PATH)?;
        let response_text = self
            .post(&url, &serialize(&request, "load request")?)
            .map_err(|e| connection_error("Failed to load collection", &e))?;

        let status: StatusResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Connection(format!("Failed to parse load response: {e}")))?;

        if status.code != 0 {
            return Err(RagError::Connection(format!(
                "Failed to load collection {}: {}",
                self.collection,
                status.message.unwrap_or_default()
            )));
        }

        info!("Collection {} loaded", self.collection);
        Ok(())
    }

    /// Nearest-neighbor search over the loaded collection.
    ///
    /// Returns up to `top_k` passages ordered nearest-first, as ranked by the
    /// server. Zero hits is a valid result, not an error.
    #[inline]
    pub fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>> {
        debug!(
            "Searching {} for the {} nearest passages",
            self.collection, top_k
        );

        let request = SearchRequest {
            collection_name: &self.collection,
            data: vec![vector],
            anns_field: VECTOR_FIELD,
            limit: top_k,
            output_fields: [TEXT_FIELD],
            search_params: SearchParams {
                metric_type: "L2",
                params: NprobeParams { nprobe: NPROBE },
            },
        };

        let url = self.endpoint(SEARCH_PATH)?;
        let response_text = self
            .post(&url, &serialize(&request, "search request")?)
            .map_err(|e| search_error("Search request failed", &e))?;

        let response: SearchResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Search(format!("Failed to parse search response: {e}")))?;

        if response.code != 0 {
            return Err(RagError::Search(format!(
                "Search failed: {}",
                response.message.unwrap_or_default()
            )));
        }

        let passages: Vec<ScoredPassage> = response
            .data
            .into_iter()
            .map(|hit| ScoredPassage {
                distance: hit.distance,
                text: hit.text,
            })
            .collect();

        debug!("Search returned {} passages", passages.len());
        Ok(passages)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Connection(format!("Failed to build URL for {path}: {e}")))
    }

    fn post(&self, url: &Url, body: &str) -> std::result::Result<String, ureq::Error> {
        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }
}

impl SearchPassages for MilvusClient {
    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>> {
        MilvusClient::search(self, vector, top_k)
    }
}

fn tls_with_root(path: &Path) -> Result<ureq::tls::TlsConfig> {
    // The agent lives for the whole process, so the certificate bytes may too.
    let pem: &'static [u8] = Box::leak(fs::read(path)?.into_boxed_slice());
    let cert = ureq::tls::Certificate::from_pem(pem).map_err(|e| {
        RagError::Connection(format!(
            "Invalid server certificate {}: {e}",
            path.display()
        ))
    })?;

    Ok(ureq::tls::TlsConfig::builder()
        .root_certs(ureq::tls::RootCerts::new_with_certs(&[cert]))
        .build())
}

fn serialize<T: Serialize>(request: &T, what: &str) -> Result<String> {
    serde_json::to_string(request)
        .map_err(|e| RagError::Search(format!("Failed to serialize {what}: {e}")))
}

fn connection_error(action: &str, error: &ureq::Error) -> RagError {
    RagError::Connection(format!("{action}: {error}"))
}

fn search_error(action: &str, error: &ureq::Error) -> RagError {
    match error {
        ureq::Error::StatusCode(status) => RagError::Search(format!("{action}: HTTP {status}")),
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => RagError::Connection(format!("{action}: {error}")),
        _ => RagError::Search(format!("{action}: {error}")),
    }
}
