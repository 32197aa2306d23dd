//! Inference backend abstraction.
//!
//! The pipeline talks to an Ollama-style HTTP service through the
//! [`InferenceBackend`] trait: a model listing, text generation, and
//! embeddings. [`ollama::OllamaClient`] is the HTTP implementation; tests
//! substitute deterministic stubs.

pub mod ollama;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Failure of a single backend call. Timeouts are reported separately but
/// every caller treats them like any other failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend call timed out")]
    Timeout,
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("invalid backend response: {0}")]
    Decode(String),
}

/// Sampling options forwarded verbatim to the generation endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// Body of `POST /generate`. Streaming is always disabled.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerationOptions,
}

impl GenerateRequest {
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            options,
        }
    }
}

/// Body of `POST /embeddings`.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub prompt: String,
}

/// The three calls the pipeline needs from an inference service.
///
/// Every call carries its own timeout; an elapsed timeout must surface as
/// [`BackendError::Timeout`].
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Names of the models currently loaded, as reported (tags included).
    async fn list_models(&self, timeout: Duration) -> Result<Vec<String>, BackendError>;

    /// Run a non-streaming completion and return the raw response text.
    async fn generate(
        &self,
        request: &GenerateRequest,
        timeout: Duration,
    ) -> Result<String, BackendError>;

    /// Embed a prompt. An empty vector is returned as-is; callers decide
    /// whether that counts as failure.
    async fn embed(
        &self,
        request: &EmbeddingRequest,
        timeout: Duration,
    ) -> Result<Vec<f32>, BackendError>;
}
