//! HTTP embedding provider - OpenAI- and Gemini-compatible endpoints
//!
//! One request per text. HTTP status codes are classified into
//! `ProviderError` variants so the client's retry policy can act on them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{EmbedMode, EmbeddingError, EmbeddingProvider, ProviderError};
use crate::config::EmbeddingConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Wire protocol spoken by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFlavor {
    OpenAi,
    Gemini,
}

impl HttpFlavor {
    fn default_base_url(self) -> &'static str {
        match self {
            HttpFlavor::OpenAi => OPENAI_BASE_URL,
            HttpFlavor::Gemini => GEMINI_BASE_URL,
        }
    }

    fn default_key_env(self) -> &'static str {
        match self {
            HttpFlavor::OpenAi => "OPENAI_API_KEY",
            HttpFlavor::Gemini => "GEMINI_API_KEY",
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    model: String,
    content: GeminiContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    embedding: GeminiValues,
}

#[derive(Debug, Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

// ============================================================================
// Provider
// ============================================================================

/// HTTP client for a remote embedding endpoint
#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    http: reqwest::Client,
    flavor: HttpFlavor,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("flavor", &self.flavor)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpEmbeddingProvider {
    pub fn new(
        flavor: HttpFlavor,
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
    ) -> Result<Self, EmbeddingError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbeddingError::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            flavor,
            base_url: base_url
                .unwrap_or(flavor.default_base_url())
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from config, reading the API key from the environment.
    pub fn from_config(flavor: HttpFlavor, config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let key_env = config
            .api_key_env
            .as_deref()
            .unwrap_or(flavor.default_key_env());
        let api_key = std::env::var(key_env)
            .map_err(|_| EmbeddingError::Fatal(format!("{key_env} is not set")))?;
        Self::new(flavor, config.base_url.as_deref(), &config.model, &api_key)
    }

    async fn embed_openai(&self, text: &str, dimension: usize) -> Result<Vec<f32>, ProviderError> {
        // Only the v3 models accept a requested dimension
        let dimensions = self.model.starts_with("text-embedding-3").then_some(dimension);
        let body = OpenAiRequest {
            model: &self.model,
            input: [text],
            dimensions,
        };

        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let parsed: OpenAiResponse = read_json(resp).await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Fatal("empty embeddings response".to_string()))
    }

    async fn embed_gemini(
        &self,
        text: &str,
        mode: EmbedMode,
        dimension: usize,
    ) -> Result<Vec<f32>, ProviderError> {
        let body = GeminiRequest {
            model: format!("models/{}", self.model),
            content: GeminiContent {
                parts: [GeminiPart { text }],
            },
            task_type: match mode {
                EmbedMode::Document => "RETRIEVAL_DOCUMENT",
                EmbedMode::Query => "RETRIEVAL_QUERY",
            },
            output_dimensionality: dimension,
        };

        let resp = self
            .http
            .post(format!("{}/models/{}:embedContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let parsed: GeminiResponse = read_json(resp).await?;
        Ok(parsed.embedding.values)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(
        &self,
        text: &str,
        mode: EmbedMode,
        dimension: usize,
    ) -> Result<Vec<f32>, ProviderError> {
        debug!(provider = self.name(), model = %self.model, chars = text.len(), "Embedding request");
        match self.flavor {
            HttpFlavor::OpenAi => self.embed_openai(text, dimension).await,
            HttpFlavor::Gemini => self.embed_gemini(text, mode, dimension).await,
        }
    }

    fn name(&self) -> &'static str {
        match self.flavor {
            HttpFlavor::OpenAi => "openai",
            HttpFlavor::Gemini => "gemini",
        }
    }
}

fn classify_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        ProviderError::Transient(e.to_string())
    } else {
        ProviderError::Fatal(e.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), truncate_for_log(&body)));
    }
    resp.json::<T>()
        .await
        .map_err(|e| ProviderError::Fatal(format!("malformed embeddings response: {e}")))
}

fn truncate_for_log(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
