
use std::env;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Collection searched for supporting passages.
pub const COLLECTION_NAME: &str = "wiki_articles";
/// Field of the collection holding the stored embedding vectors.
pub const VECTOR_FIELD: &str = "vector";
/// Field of the collection holding the passage text.
pub const TEXT_FIELD: &str = "article_text";
/// Number of nearest passages fetched per question.
pub const TOP_K: usize = 5;
/// IVF cluster probe count for the similarity search.
pub const NPROBE: u32 = 5;
/// Model served by the embedding inference endpoint.
pub const EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// Hosted model used for answer generation.
pub const GENERATION_MODEL: &str = "ibm/granite-13b-chat-v2";
/// Server certificate expected alongside the binary.
pub const MILVUS_CERT_FILE: &str = "cert.crt";

const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const DEFAULT_EMBEDDER_URL: &str = "http://localhost:8080";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";
// Fallback credential pair from the watsonx.data lab setup this collection
// ships with. Override with MILVUS_USER / MILVUS_PASSWORD.
const DEFAULT_MILVUS_USER: &str = "ibmlhadmin";
const DEFAULT_MILVUS_PASSWORD: &str = "password";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub milvus: MilvusConfig,
    pub watsonx: WatsonxConfig,
    pub embedder: EmbedderConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MilvusConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub cert_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatsonxConfig {
    pub url: String,
    pub api_key: String,
    pub project_id: String,
    pub iam_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedderConfig {
    pub url: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EMBEDDER_URL.to_string(),
            model: EMBEDDING_MODEL.to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(String),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
}

impl Config {
    /// Read the full configuration from the process environment.
    ///
    /// Executes once at startup, before any client is constructed. Missing or
    /// malformed required values fail here rather than surfacing later as
    /// connection or authentication errors.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            milvus: MilvusConfig {
                protocol: "https".to_string(),
                host: require(lookup, "MILVUS_HOST")?,
                port: parse_port(&require(lookup, "MILVUS_PORT")?)?,
                username: optional(lookup, "MILVUS_USER", DEFAULT_MILVUS_USER),
                password: optional(lookup, "MILVUS_PASSWORD", DEFAULT_MILVUS_PASSWORD),
                cert_path: PathBuf::from(MILVUS_CERT_FILE),
            },
            watsonx: WatsonxConfig {
                url: require(lookup, "IBM_CLOUD_URL")?,
                api_key: require(lookup, "API_KEY")?,
                project_id: require(lookup, "PROJECT_ID")?,
                iam_url: optional(lookup, "IAM_URL", DEFAULT_IAM_URL),
            },
            embedder: EmbedderConfig {
                url: optional(lookup, "EMBEDDER_URL", DEFAULT_EMBEDDER_URL),
                model: optional(lookup, "EMBEDDER_MODEL", EMBEDDING_MODEL),
            },
            server: ServerConfig {
                bind_addr: optional(lookup, "BIND_ADDR", DEFAULT_BIND_ADDR),
            },
        };

        config.validate()?;

        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.milvus.validate()?;
        self.watsonx.base_url()?;
        self.watsonx.iam_endpoint()?;
        self.embedder.base_url()?;

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddr(self.server.bind_addr.clone()));
        }

        Ok(())
    }
}

impl MilvusConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }
        self.base_url()?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl WatsonxConfig {
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))
    }

    pub fn iam_endpoint(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.iam_url).map_err(|_| ConfigError::InvalidUrl(self.iam_url.clone()))
    }
}

impl EmbedderConfig {
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))
    }
}

fn require(lookup: &dyn Fn(&str) -> Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn optional(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(value.to_string())),
    }
}
