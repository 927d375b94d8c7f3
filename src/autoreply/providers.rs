//! Reqwest clients for the text-generation providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash-latest:generateContent";

const HUGGINGFACE_API_URL: &str =
    "https://api-inference.huggingface.co/models/facebook/blenderbot-400M-distill";

/// Failure modes of a single provider request.
#[derive(Debug)]
pub enum ProviderError {
    /// The provider's 429-equivalent; the credential should cool down.
    RateLimited,
    /// Any other transport or API failure.
    Failed(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited (429)"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// One call to an external text-generation endpoint.
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, credential: &str, prompt: &str) -> Result<String, ProviderError>;
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
}

// ---------------------------------------------------------------------------
// Google Gemini
// ---------------------------------------------------------------------------

pub struct GeminiProvider {
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    async fn generate(&self, credential: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!("{GEMINI_API_URL}?key={credential}");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Failed(format!("HTTP error: {e}")))?;

        let status = response.status();
        debug!("Gemini response status: {status}");

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Failed(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::Failed(format!("API error {status}: {body}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Failed(format!("Failed to parse response: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::Failed(format!("Gemini error: {}", error.message)));
        }

        let text = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| ProviderError::Failed("No text in response".to_string()))?;

        Ok(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Hugging Face inference
// ---------------------------------------------------------------------------

pub struct HuggingFaceProvider {
    client: reqwest::Client,
}

#[derive(Serialize)]
struct InferenceRequest {
    inputs: String,
}

#[derive(Deserialize, Debug)]
struct InferenceResponse {
    generated_text: String,
}

impl HuggingFaceProvider {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }
}

#[async_trait]
impl TextProvider for HuggingFaceProvider {
    async fn generate(&self, credential: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = InferenceRequest {
            inputs: prompt.to_string(),
        };

        let response = self
            .client
            .post(HUGGINGFACE_API_URL)
            .header("Authorization", format!("Bearer {credential}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Failed(format!("HTTP error: {e}")))?;

        let status = response.status();
        debug!("Hugging Face response status: {status}");

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Failed(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::Failed(format!("API error {status}: {body}")));
        }

        let parsed: Vec<InferenceResponse> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Failed(format!("Failed to parse response: {e}")))?;

        let text = parsed
            .into_iter()
            .next()
            .map(|r| r.generated_text)
            .ok_or_else(|| ProviderError::Failed("Empty response array".to_string()))?;

        Ok(text.trim().to_string())
    }
}
