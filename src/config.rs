use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::pipeline::embed::FailurePolicy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SkillswapConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub backend: BackendConfig,
    pub pipeline: PipelineConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub artifact_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub generation_model: String,
    pub embedding_model: String,
    pub availability_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    pub single_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub failure_policy: FailurePolicy,
    pub rebuild_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8421,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = default_skillswap_dir();
        Self {
            db_path: base.join("skill_swap.db").to_string_lossy().into_owned(),
            artifact_dir: base.join("embeddings").to_string_lossy().into_owned(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/api".into(),
            generation_model: "phi3".into(),
            embedding_model: "mxbai-embed-large".into(),
            availability_timeout_secs: 5,
            batch_timeout_secs: 15,
            single_timeout_secs: 8,
            embedding_timeout_secs: 15,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_workers: 3,
            failure_policy: FailurePolicy::Strict,
            rebuild_timeout_secs: 600,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_top_k: 5 }
    }
}

impl BackendConfig {
    pub fn availability_timeout(&self) -> Duration {
        Duration::from_secs(self.availability_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn single_timeout(&self) -> Duration {
        Duration::from_secs(self.single_timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }
}

/// Returns `~/.skillswap/`, or `./.skillswap` when no home directory is known.
pub fn default_skillswap_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skillswap")
}

/// Returns the default config file path: `~/.skillswap/config.toml`
pub fn default_config_path() -> PathBuf {
    default_skillswap_dir().join("config.toml")
}

impl SkillswapConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SkillswapConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (SKILLSWAP_DB, SKILLSWAP_ARTIFACT_DIR, SKILLSWAP_BACKEND_URL, SKILLSWAP_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SKILLSWAP_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SKILLSWAP_ARTIFACT_DIR") {
            self.storage.artifact_dir = val;
        }
        if let Ok(val) = std::env::var("SKILLSWAP_BACKEND_URL") {
            self.backend.base_url = val;
        }
        if let Ok(val) = std::env::var("SKILLSWAP_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.pipeline.batch_size >= 1, "pipeline.batch_size must be at least 1");
        anyhow::ensure!(self.pipeline.max_workers >= 1, "pipeline.max_workers must be at least 1");
        anyhow::ensure!(
            !self.backend.generation_model.is_empty() && !self.backend.embedding_model.is_empty(),
            "backend.generation_model and backend.embedding_model must be set"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the directory holding the index and manifest pair.
    pub fn resolved_artifact_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.artifact_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SkillswapConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.backend.generation_model, "phi3");
        assert_eq!(config.backend.embedding_model, "mxbai-embed-large");
        assert_eq!(config.pipeline.batch_size, 5);
        assert_eq!(config.pipeline.max_workers, 3);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert!(config.storage.db_path.ends_with("skill_swap.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[backend]
base_url = "http://gpu-box:11434/api"
batch_timeout_secs = 30

[pipeline]
max_workers = 8
failure_policy = "best_effort"
"#;
        let config: SkillswapConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.backend.base_url, "http://gpu-box:11434/api");
        assert_eq!(config.backend.batch_timeout(), Duration::from_secs(30));
        assert_eq!(config.pipeline.max_workers, 8);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::BestEffort);
        // defaults still apply for unset fields
        assert_eq!(config.backend.single_timeout_secs, 8);
        assert_eq!(config.pipeline.batch_size, 5);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = SkillswapConfig::default();
        config.pipeline.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SkillswapConfig::default();
        std::env::set_var("SKILLSWAP_DB", "/tmp/override.db");
        std::env::set_var("SKILLSWAP_ARTIFACT_DIR", "/tmp/artifacts");
        std::env::set_var("SKILLSWAP_BACKEND_URL", "http://other:11434/api");
        std::env::set_var("SKILLSWAP_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.storage.artifact_dir, "/tmp/artifacts");
        assert_eq!(config.backend.base_url, "http://other:11434/api");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("SKILLSWAP_DB");
        std::env::remove_var("SKILLSWAP_ARTIFACT_DIR");
        std::env::remove_var("SKILLSWAP_BACKEND_URL");
        std::env::remove_var("SKILLSWAP_LOG_LEVEL");
    }
}
