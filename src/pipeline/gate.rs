//! Availability gate: is the backend up, and are both required models loaded?

use std::time::Duration;

use serde::Serialize;

use crate::backend::InferenceBackend;

/// The generation and embedding models a pipeline run depends on.
#[derive(Debug, Clone)]
pub struct RequiredModels {
    pub generation: String,
    pub embedding: String,
}

impl RequiredModels {
    fn base_names(&self) -> [&str; 2] {
        [base_model_name(&self.generation), base_model_name(&self.embedding)]
    }
}

/// Outcome of a readiness probe.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub reachable: bool,
    /// Base names of every model the backend reported.
    pub available: Vec<String>,
    /// Required base names the backend did not report.
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.reachable && self.missing.is_empty()
    }
}

/// Strip the tag suffix: `phi3:latest` -> `phi3`.
pub fn base_model_name(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

/// Probe the backend's model listing and compare against `required`.
pub async fn check_backend(
    backend: &dyn InferenceBackend,
    required: &RequiredModels,
    timeout: Duration,
) -> ReadinessReport {
    let models = match backend.list_models(timeout).await {
        Ok(models) => models,
        Err(e) => {
            tracing::error!(error = %e, "inference backend check failed");
            return ReadinessReport {
                reachable: false,
                available: Vec::new(),
                missing: required.base_names().iter().map(|s| s.to_string()).collect(),
                error: Some(e.to_string()),
            };
        }
    };

    let available: Vec<String> = models
        .iter()
        .map(|name| base_model_name(name).to_string())
        .collect();
    let missing: Vec<String> = required
        .base_names()
        .iter()
        .filter(|name| !available.iter().any(|a| a.as_str() == **name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        tracing::info!("inference backend and models available");
    } else {
        tracing::error!(?missing, "inference backend is missing required models");
    }

    ReadinessReport {
        reachable: true,
        available,
        missing,
        error: None,
    }
}

/// `true` only when the backend answered and both required models are present.
pub async fn check_backend_ready(
    backend: &dyn InferenceBackend,
    required: &RequiredModels,
    timeout: Duration,
) -> bool {
    check_backend(backend, required, timeout).await.is_ready()
}
