
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use url::form_urlencoded;

use crate::config::{GENERATION_MODEL, WatsonxConfig};
use crate::rag::GenerateText;
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
/// API version pinned for the text generation endpoint.
const API_VERSION: &str = "2023-05-29";
/// Refresh the IAM token this long before it would expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Client for hosted text generation on watsonx.ai.
///
/// The model and decoding parameters are fixed for the process lifetime:
/// greedy decoding, between 1 and 500 new tokens, temperature 0 — the output
/// is deterministic for a given prompt and model version. Calls block until
/// the full text is returned; there is no streaming and no retry.
pub struct WatsonxClient {
    base_url: Url,
    iam_url: Url,
    api_key: String,
    project_id: String,
    model_id: String,
    agent: ureq::Agent,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    acquired: Instant,
    lifetime: Duration,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.acquired.elapsed() + TOKEN_EXPIRY_MARGIN < self.lifetime
    }
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model_id: &'a str,
    input: &'a str,
    parameters: DecodingParameters,
    project_id: &'a str,
}

#[derive(Debug, Serialize)]
struct DecodingParameters {
    decoding_method: &'static str,
    min_new_tokens: u32,
    max_new_tokens: u32,
    temperature: f32,
}

impl Default for DecodingParameters {
    fn default() -> Self {
        Self {
            decoding_method: "greedy",
            min_new_tokens: 1,
            max_new_tokens: 500,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    results: Vec<GenerationResult>,
}

#[derive(Debug, Deserialize)]
struct GenerationResult {
    generated_text: String,
}

impl WatsonxClient {
    #[inline]
    pub fn new(config: &WatsonxConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let iam_url = config
            .iam_endpoint()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            iam_url,
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
            model_id: GENERATION_MODEL.to_string(),
            agent,
            token: Mutex::new(None),
        })
    }

    /// Generate the answer text for one prompt.
    #[inline]
    pub fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Generating text for prompt (length: {})", prompt.len());

        let token = self.bearer_token()?;

        let mut url = self
            .base_url
            .join("ml/v1/text/generation")
            .map_err(|e| RagError::Generation(format!("Failed to build generation URL: {e}")))?;
        url.set_query(Some(&format!("version={API_VERSION}")));

        let request = GenerationRequest {
            model_id: &self.model_id,
            input: prompt,
            parameters: DecodingParameters::default(),
            project_id: &self.project_id,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            RagError::Generation(format!("Failed to serialize generation request: {e}"))
        })?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {token}"))
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| request_error("Text generation request failed", &e))?;

        let response: GenerationResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Generation(format!("Failed to parse generation response: {e}")))?;

        let text = response
            .results
            .into_iter()
            .next()
            .map(|result| result.generated_text)
            .ok_or_else(|| {
                RagError::Generation("Generation response contained no results".to_string())
            })?;

        debug!("Generated {} characters", text.len());
        Ok(text)
    }

    fn bearer_token(&self) -> Result<String> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| RagError::Generation("IAM token cache poisoned".to_string()))?;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch_token()?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    fn fetch_token(&self) -> Result<CachedToken> {
        info!("Exchanging API key for an IAM access token");

        let body: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "urn:ibm:params:oauth:grant-type:apikey")
            .append_pair("apikey", &self.api_key)
            .finish();

        let response_text = self
            .agent
            .post(self.iam_url.as_str())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| request_error("IAM token request failed", &e))?;

        let response: IamTokenResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Generation(format!("Failed to parse IAM token response: {e}")))?;

        Ok(CachedToken {
            access_token: response.access_token,
            acquired: Instant::now(),
            lifetime: Duration::from_secs(response.expires_in),
        })
    }
}

impl GenerateText for WatsonxClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        WatsonxClient::generate(self, prompt)
    }
}

fn request_error(action: &str, error: &ureq::Error) -> RagError {
    match error {
        ureq::Error::StatusCode(status) => RagError::Generation(format!("{action}: HTTP {status}")),
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => RagError::Connection(format!("{action}: {error}")),
        _ => RagError::Generation(format!("{action}: {error}")),
    }
}
