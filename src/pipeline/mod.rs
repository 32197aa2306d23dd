//! The skill indexing pipeline.
//!
//! A rebuild runs, in order: [`dedup::dedupe`], the availability gate
//! ([`gate::check_backend`]), [`describe::DescriptionGenerator::describe`],
//! [`embed::EmbeddingFetcher::embed_all`], [`FlatIndex::build`] and finally
//! [`ArtifactStore::save`]. Any failure before the save leaves the previous
//! index and manifest untouched. Queries reuse the describe and embed stages
//! against the persisted pair.

pub mod dedup;
pub mod describe;
pub mod embed;
pub mod gate;
pub mod query;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::backend::ollama::OllamaClient;
use crate::backend::{BackendError, InferenceBackend};
use crate::config::SkillswapConfig;
use crate::db::SkillSource;
use crate::index::store::{ArtifactError, ArtifactMeta, ArtifactStore, LoadedArtifacts};
use crate::index::FlatIndex;
use describe::{DescriptionGenerator, LabelMatcher};
use embed::{EmbeddingFetcher, FailurePolicy};
use gate::{ReadinessReport, RequiredModels};
use query::SkillMatch;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no skills to index")]
    NoSkills,
    #[error("inference backend unavailable (missing models: {missing:?})")]
    BackendUnavailable { missing: Vec<String> },
    #[error("embedding generation failed")]
    EmbeddingFailed,
    #[error("no vectors to index")]
    EmptyIndex,
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("rebuild did not finish within {0:?}")]
    DeadlineExceeded(Duration),
    #[error("failed to read skills: {0}")]
    Source(#[from] rusqlite::Error),
}

/// Everything a [`Pipeline`] needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub required: RequiredModels,
    pub availability_timeout: Duration,
    pub batch_timeout: Duration,
    pub single_timeout: Duration,
    pub embedding_timeout: Duration,
    pub batch_size: usize,
    pub max_workers: usize,
    pub failure_policy: FailurePolicy,
    pub rebuild_timeout: Duration,
    pub default_top_k: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &SkillswapConfig) -> Self {
        Self {
            required: RequiredModels {
                generation: config.backend.generation_model.clone(),
                embedding: config.backend.embedding_model.clone(),
            },
            availability_timeout: config.backend.availability_timeout(),
            batch_timeout: config.backend.batch_timeout(),
            single_timeout: config.backend.single_timeout(),
            embedding_timeout: config.backend.embedding_timeout(),
            batch_size: config.pipeline.batch_size,
            max_workers: config.pipeline.max_workers,
            failure_policy: config.pipeline.failure_policy,
            rebuild_timeout: Duration::from_secs(config.pipeline.rebuild_timeout_secs),
            default_top_k: config.retrieval.default_top_k,
        }
    }
}

/// Result of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildOutcome {
    /// Manifest order: one entry per index row.
    pub skills: Vec<String>,
    pub meta: ArtifactMeta,
    pub elapsed_ms: u64,
}

pub struct Pipeline {
    backend: Arc<dyn InferenceBackend>,
    options: PipelineOptions,
    describer: DescriptionGenerator,
    fetcher: EmbeddingFetcher,
    artifacts: ArtifactStore,
}

impl Pipeline {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        artifacts: ArtifactStore,
        options: PipelineOptions,
    ) -> Self {
        let describer = DescriptionGenerator::new(
            Arc::clone(&backend),
            options.required.generation.clone(),
            options.batch_timeout,
            options.single_timeout,
        );
        let fetcher = EmbeddingFetcher::new(
            Arc::clone(&backend),
            options.required.embedding.clone(),
            options.embedding_timeout,
            options.failure_policy,
        );
        Self {
            backend,
            options,
            describer,
            fetcher,
            artifacts,
        }
    }

    /// Pipeline over the HTTP backend and artifact directory named in `config`.
    pub fn from_config(config: &SkillswapConfig) -> Result<Self, BackendError> {
        let client = OllamaClient::new(config.backend.base_url.clone())?;
        Ok(Self::new(
            Arc::new(client),
            ArtifactStore::new(config.resolved_artifact_dir()),
            PipelineOptions::from_config(config),
        ))
    }

    /// Swap the label matcher used when parsing batch descriptions.
    pub fn with_matcher(mut self, matcher: Box<dyn LabelMatcher>) -> Self {
        self.describer = self.describer.with_matcher(matcher);
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn readiness(&self) -> ReadinessReport {
        gate::check_backend(
            self.backend.as_ref(),
            &self.options.required,
            self.options.availability_timeout,
        )
        .await
    }

    /// Rebuild the index and manifest from the raw skill list.
    ///
    /// Bounded by the configured rebuild deadline; when it elapses in-flight
    /// embedding tasks are aborted and nothing is written.
    pub async fn rebuild(&self, raw_skills: &[String]) -> Result<RebuildOutcome, PipelineError> {
        let deadline = self.options.rebuild_timeout;
        match tokio::time::timeout(deadline, self.run_rebuild(raw_skills)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(deadline_secs = deadline.as_secs(), "rebuild deadline exceeded");
                Err(PipelineError::DeadlineExceeded(deadline))
            }
        }
    }

    /// Read the skill list from `source` now, then rebuild from it.
    ///
    /// The source is only borrowed for the synchronous read; the returned
    /// future holds nothing but `self`.
    pub fn rebuild_from_store<S: SkillSource + ?Sized>(
        &self,
        source: &S,
    ) -> impl Future<Output = Result<RebuildOutcome, PipelineError>> + '_ {
        let skills = source.offered_skills();
        async move {
            let skills = skills?;
            self.rebuild(&skills).await
        }
    }

    async fn run_rebuild(&self, raw_skills: &[String]) -> Result<RebuildOutcome, PipelineError> {
        let started = Instant::now();

        let skills = dedup::dedupe(raw_skills);
        tracing::info!(total = raw_skills.len(), unique = skills.len(), "deduplicated skills");
        if skills.is_empty() {
            tracing::warn!("no skills found, keeping existing index");
            return Err(PipelineError::NoSkills);
        }

        let report = self.readiness().await;
        if !report.is_ready() {
            return Err(PipelineError::BackendUnavailable {
                missing: report.missing,
            });
        }

        let descriptions = self.describer.describe(&skills, self.options.batch_size).await;
        let pairs: Vec<(String, String)> = skills
            .iter()
            .map(|skill| {
                let description = descriptions
                    .get(skill)
                    .cloned()
                    .unwrap_or_else(|| skill.clone());
                (skill.clone(), description)
            })
            .collect();

        let batch = self.fetcher.embed_all(&pairs, self.options.max_workers).await;
        if batch.is_empty() {
            tracing::error!("failed to generate embeddings");
            return Err(PipelineError::EmbeddingFailed);
        }

        let index = FlatIndex::build(batch.matrix).ok_or(PipelineError::EmptyIndex)?;
        let meta = self.artifacts.save(&index, &batch.skills)?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(rows = meta.rows, elapsed_ms, "pipeline finished");

        Ok(RebuildOutcome {
            skills: batch.skills,
            meta,
            elapsed_ms,
        })
    }

    /// Query against an already loaded pair.
    pub async fn query_loaded(
        &self,
        term: &str,
        loaded: &LoadedArtifacts,
        top_k: usize,
    ) -> Vec<SkillMatch> {
        query::query(
            &self.describer,
            &self.fetcher,
            term,
            &loaded.index,
            &loaded.manifest,
            top_k,
        )
        .await
    }

    /// Open the current pair and query it. Missing or mismatched artifacts, an
    /// unavailable backend, or a failed query embedding all yield no results.
    pub async fn query_similar(&self, term: &str, top_k: usize) -> Vec<SkillMatch> {
        let loaded = match self.artifacts.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "cannot query: index unavailable, rebuild required");
                return Vec::new();
            }
        };

        if !self.readiness().await.is_ready() {
            return Vec::new();
        }

        self.query_loaded(term, &loaded, top_k).await
    }
}
