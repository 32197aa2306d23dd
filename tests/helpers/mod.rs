#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skillswap::backend::{BackendError, EmbeddingRequest, GenerateRequest, InferenceBackend};
use skillswap::index::store::ArtifactStore;
use skillswap::pipeline::embed::FailurePolicy;
use skillswap::pipeline::gate::RequiredModels;
use skillswap::pipeline::{Pipeline, PipelineOptions};

pub const DIM: usize = 16;

/// Deterministic, never-zero embedding of `text`.
pub fn text_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    for (i, b) in text.bytes().enumerate() {
        v[(b as usize * 31 + i) % dim] += 1.0 + (b % 7) as f32;
    }
    v
}

pub fn normalized(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

/// The description the stub produces for a skill, batch or single.
pub fn stub_description(skill: &str) -> String {
    format!("{skill} is a skill.")
}

/// In-process [`InferenceBackend`] with switchable failures and call counters.
pub struct StubBackend {
    pub models: Vec<String>,
    pub unreachable: bool,
    pub fail_batches: bool,
    pub fail_singles: bool,
    /// Replaces the generated batch reply verbatim.
    pub batch_reply: Option<String>,
    /// Embedding calls whose prompt contains any of these fail.
    pub fail_embedding_for: Vec<String>,
    /// Embedding calls whose prompt contains any of these return `[]`.
    pub empty_embedding_for: Vec<String>,
    pub embed_delay: Duration,
    pub generate_delay: Duration,
    pub dimension: usize,
    pub tag_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub generate_in_flight: AtomicUsize,
    pub max_generate_in_flight: AtomicUsize,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self {
            models: vec!["phi3:latest".into(), "mxbai-embed-large:latest".into()],
            unreachable: false,
            fail_batches: false,
            fail_singles: false,
            batch_reply: None,
            fail_embedding_for: Vec::new(),
            empty_embedding_for: Vec::new(),
            embed_delay: Duration::ZERO,
            generate_delay: Duration::ZERO,
            dimension: DIM,
            tag_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            generate_in_flight: AtomicUsize::new(0),
            max_generate_in_flight: AtomicUsize::new(0),
        }
    }
}

impl StubBackend {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn batch_listing(prompt: &str) -> Vec<String> {
        prompt
            .lines()
            .skip(1)
            .take_while(|line| !line.trim().is_empty())
            .filter_map(|line| line.split_once(". ").map(|(_, skill)| skill.to_string()))
            .collect()
    }

    fn reply_to(&self, request: &GenerateRequest) -> Result<String, BackendError> {
        if let Some(rest) = request.prompt.strip_prefix("Describe the skill '") {
            self.single_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_singles {
                return Err(BackendError::Status(500));
            }
            let skill = rest.rsplit_once('\'').map(|(s, _)| s).unwrap_or(rest);
            return Ok(stub_description(skill));
        }

        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches {
            return Err(BackendError::Timeout);
        }
        if let Some(reply) = &self.batch_reply {
            return Ok(reply.clone());
        }
        let reply = Self::batch_listing(&request.prompt)
            .iter()
            .enumerate()
            .map(|(i, skill)| format!("{}. {skill}: {}", i + 1, stub_description(skill)))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(reply)
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    async fn list_models(&self, _timeout: Duration) -> Result<Vec<String>, BackendError> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(BackendError::Unreachable("connection refused".into()));
        }
        Ok(self.models.clone())
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        _timeout: Duration,
    ) -> Result<String, BackendError> {
        let now = self.generate_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_generate_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.generate_delay.is_zero() {
            tokio::time::sleep(self.generate_delay).await;
        }
        let reply = self.reply_to(request);
        self.generate_in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    async fn embed(
        &self,
        request: &EmbeddingRequest,
        _timeout: Duration,
    ) -> Result<Vec<f32>, BackendError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.embed_delay.is_zero() {
            tokio::time::sleep(self.embed_delay).await;
        }

        let mentions = |needles: &[String]| {
            needles.iter().any(|s| request.prompt.contains(s.as_str()))
        };
        let result = if mentions(&self.fail_embedding_for) {
            Err(BackendError::Status(500))
        } else if mentions(&self.empty_embedding_for) {
            Ok(Vec::new())
        } else {
            Ok(text_embedding(&request.prompt, self.dimension))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn test_options(policy: FailurePolicy) -> PipelineOptions {
    PipelineOptions {
        required: RequiredModels {
            generation: "phi3".into(),
            embedding: "mxbai-embed-large".into(),
        },
        availability_timeout: Duration::from_secs(1),
        batch_timeout: Duration::from_secs(1),
        single_timeout: Duration::from_secs(1),
        embedding_timeout: Duration::from_secs(1),
        batch_size: 5,
        max_workers: 3,
        failure_policy: policy,
        rebuild_timeout: Duration::from_secs(30),
        default_top_k: 5,
    }
}

pub fn test_pipeline(backend: &Arc<StubBackend>, dir: &Path) -> Pipeline {
    test_pipeline_with(backend, dir, test_options(FailurePolicy::Strict))
}

pub fn test_pipeline_with(
    backend: &Arc<StubBackend>,
    dir: &Path,
    options: PipelineOptions,
) -> Pipeline {
    let backend: Arc<dyn InferenceBackend> = backend.clone();
    Pipeline::new(backend, ArtifactStore::new(dir), options)
}

pub fn skills(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
