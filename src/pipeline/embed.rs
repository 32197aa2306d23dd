//! Bounded concurrent embedding fetch.
//!
//! One task per `(skill, description)` pair is spawned on a [`JoinSet`]; a
//! [`Semaphore`] caps how many are talking to the backend at once. Each task
//! reports back its input position, so rows are re-associated with their
//! skill regardless of completion order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::backend::{EmbeddingRequest, InferenceBackend};

/// What to do when a single embedding call fails or comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure discards the whole batch.
    #[default]
    Strict,
    /// Failed skills are dropped; the rest are returned.
    BestEffort,
}

/// Embedding rows and the skill each row belongs to, position for position.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub matrix: Array2<f32>,
    pub skills: Vec<String>,
}

impl EmbeddingBatch {
    pub fn empty() -> Self {
        Self {
            matrix: Array2::zeros((0, 0)),
            skills: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }
}

enum Fetched {
    Vector(Vec<f32>),
    Failed(String),
    /// Not attempted because the run was already aborted.
    Skipped,
}

pub struct EmbeddingFetcher {
    backend: Arc<dyn InferenceBackend>,
    model: String,
    timeout: Duration,
    policy: FailurePolicy,
}

impl EmbeddingFetcher {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        model: impl Into<String>,
        timeout: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Embed every pair's description with at most `max_workers` calls in flight.
    ///
    /// Under [`FailurePolicy::Strict`] the first failure stops new calls from
    /// starting; calls already in flight drain and their results are thrown
    /// away, and the returned batch is empty.
    pub async fn embed_all(
        &self,
        pairs: &[(String, String)],
        max_workers: usize,
    ) -> EmbeddingBatch {
        if pairs.is_empty() {
            return EmbeddingBatch::empty();
        }

        let total = pairs.len();
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(max_workers.max(1)));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        tracing::info!(pairs = total, workers = max_workers.max(1), "generating embeddings");

        for (position, (_, description)) in pairs.iter().enumerate() {
            let backend = Arc::clone(&self.backend);
            let permits = Arc::clone(&permits);
            let aborted = Arc::clone(&aborted);
            let request = EmbeddingRequest {
                model: self.model.clone(),
                prompt: description.clone(),
            };
            let timeout = self.timeout;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (position, Fetched::Skipped);
                };
                if aborted.load(Ordering::Acquire) {
                    return (position, Fetched::Skipped);
                }
                let fetched = match backend.embed(&request, timeout).await {
                    Ok(vector) if vector.is_empty() => Fetched::Failed("empty embedding".into()),
                    Ok(vector) => Fetched::Vector(vector),
                    Err(e) => Fetched::Failed(e.to_string()),
                };
                (position, fetched)
            });
        }

        let mut rows: Vec<Option<Vec<f32>>> = vec![None; total];
        let mut dimension: Option<usize> = None;
        let mut completed = 0usize;
        let mut failed = false;

        while let Some(joined) = tasks.join_next().await {
            let (position, fetched) = match joined {
                Ok(out) => out,
                Err(e) => {
                    tracing::error!(error = %e, "embedding task did not complete");
                    failed = true;
                    if self.policy == FailurePolicy::Strict {
                        aborted.store(true, Ordering::Release);
                    }
                    continue;
                }
            };
            let skill = &pairs[position].0;

            let outcome = match fetched {
                Fetched::Skipped => continue,
                Fetched::Failed(reason) => Err(reason),
                Fetched::Vector(vector) => {
                    let expected = *dimension.get_or_insert(vector.len());
                    if vector.len() == expected {
                        Ok(vector)
                    } else {
                        Err(format!("dimension {} differs from {expected}", vector.len()))
                    }
                }
            };

            match outcome {
                Ok(vector) => {
                    completed += 1;
                    tracing::info!(skill = %skill, "embedding {completed}/{total}");
                    rows[position] = Some(vector);
                }
                Err(reason) => {
                    tracing::error!(skill = %skill, reason = %reason, "embedding failed");
                    failed = true;
                    if self.policy == FailurePolicy::Strict {
                        aborted.store(true, Ordering::Release);
                    }
                }
            }
        }

        if failed && self.policy == FailurePolicy::Strict {
            tracing::error!(completed, total, "embedding run aborted, discarding partial results");
            return EmbeddingBatch::empty();
        }

        let Some(dim) = dimension else {
            tracing::error!("no embeddings generated");
            return EmbeddingBatch::empty();
        };

        let mut flat = Vec::with_capacity(completed * dim);
        let mut skills = Vec::with_capacity(completed);
        for (position, row) in rows.into_iter().enumerate() {
            if let Some(vector) = row {
                flat.extend(vector);
                skills.push(pairs[position].0.clone());
            }
        }

        if skills.is_empty() {
            tracing::error!("no embeddings generated");
            return EmbeddingBatch::empty();
        }

        match Array2::from_shape_vec((skills.len(), dim), flat) {
            Ok(matrix) => {
                tracing::info!(
                    rows = skills.len(),
                    dimension = dim,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "embeddings generated"
                );
                EmbeddingBatch { matrix, skills }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to assemble embedding matrix");
                EmbeddingBatch::empty()
            }
        }
    }
}
