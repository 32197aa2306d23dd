//! HTTP client for an Ollama-compatible inference service.
//!
//! Calls `GET {base}/tags`, `POST {base}/generate` and `POST {base}/embeddings`
//! where `base` is the API root, e.g. `http://localhost:11434/api`. No retries:
//! the pipeline owns the fallback policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BackendError, EmbeddingRequest, GenerateRequest, InferenceBackend};

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// [`InferenceBackend`] over HTTP.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        response.json::<T>().await.map_err(map_reqwest_error)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn list_models(&self, timeout: Duration) -> Result<Vec<String>, BackendError> {
        let response = self
            .http
            .get(self.endpoint("tags"))
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let tags: TagsResponse = Self::read_json(response).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.endpoint("generate"))
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: GenerateResponse = Self::read_json(response).await?;
        Ok(body.response)
    }

    async fn embed(
        &self,
        request: &EmbeddingRequest,
        timeout: Duration,
    ) -> Result<Vec<f32>, BackendError> {
        let response = self
            .http
            .post(self.endpoint("embeddings"))
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: EmbeddingResponse = Self::read_json(response).await?;
        Ok(body.embedding)
    }
}
