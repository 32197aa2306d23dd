//! CLI `rebuild` command: regenerate the skill index from the database.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use skillswap::config::SkillswapConfig;
use skillswap::db;
use skillswap::pipeline::{Pipeline, PipelineError};

/// Read every offered skill and rebuild the index and manifest.
pub async fn rebuild(config: &SkillswapConfig) -> Result<()> {
    let pipeline = super::build_pipeline(config)?;
    run(config, &pipeline).await
}

pub(crate) async fn run(config: &SkillswapConfig, pipeline: &Pipeline) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path()).context("failed to open database")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("  {spinner} {msg} [{elapsed}]")?);
    pb.set_message("Indexing offered skills...");
    pb.enable_steady_tick(Duration::from_millis(120));

    let result = pipeline.rebuild_from_store(&conn).await;
    pb.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(PipelineError::NoSkills) => {
            println!("No skills found in database; index left unchanged.");
            return Ok(());
        }
        Err(e) => return Err(e).context("rebuild failed; previous index left in place"),
    };
    println!(
        "Indexed {} skills ({}-dim) in {:.2}s.",
        outcome.meta.rows,
        outcome.meta.dimension,
        outcome.elapsed_ms as f64 / 1000.0
    );
    println!("  Index:    {}", pipeline.artifacts().index_path().display());
    println!("  Manifest: {}", pipeline.artifacts().manifest_path().display());
    Ok(())
}
