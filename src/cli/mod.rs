pub mod add_skill;
pub mod doctor;
pub mod query;
pub mod rebuild;

use anyhow::{Context, Result};

use skillswap::config::SkillswapConfig;
use skillswap::pipeline::Pipeline;

pub fn build_pipeline(config: &SkillswapConfig) -> Result<Pipeline> {
    Pipeline::from_config(config).context("failed to create inference backend client")
}
