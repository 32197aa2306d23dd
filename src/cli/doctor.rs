//! CLI `doctor` command: check the backend, database and index pair.

use anyhow::Result;

use skillswap::config::SkillswapConfig;
use skillswap::db;
use skillswap::index::store::ArtifactError;

pub async fn doctor(config: &SkillswapConfig) -> Result<()> {
    let pipeline = super::build_pipeline(config)?;

    println!("Skillswap Health Report");
    println!("=======================");
    println!();

    let report = pipeline.readiness().await;
    println!("Backend:           {}", config.backend.base_url);
    if report.reachable {
        println!("  Reachable:       yes");
        println!("  Models:          {}", report.available.join(", "));
    } else {
        println!(
            "  Reachable:       no ({})",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    if report.missing.is_empty() {
        println!("  Required models: OK");
    } else {
        println!("  Missing models:  {}", report.missing.join(", "));
    }
    println!();

    let db_path = config.resolved_db_path();
    if db_path.exists() {
        let conn = db::open_database(&db_path)?;
        let stats = db::skill_stats(&conn)?;
        println!("Database:          {}", db_path.display());
        println!("  Users:           {}", stats.users);
        println!("  Skill rows:      {}", stats.skill_rows);
        println!("  Distinct skills: {}", stats.distinct_skills);
    } else {
        println!("Database:          not found at {}", db_path.display());
    }
    println!();

    let artifacts = pipeline.artifacts();
    println!("Index:             {}", artifacts.index_path().display());
    println!("Manifest:          {}", artifacts.manifest_path().display());
    match artifacts.load() {
        Ok(loaded) => {
            println!("  Rows:            {}", loaded.meta.rows);
            println!("  Dimension:       {}", loaded.meta.dimension);
            println!("  Built at:        {}", loaded.meta.built_at.to_rfc3339());
            println!("  Pair check:      PASSED");
        }
        Err(ArtifactError::Missing(path)) => {
            println!("  Status:          missing {}", path.display());
            println!("  Run `skillswap rebuild` to create it.");
        }
        Err(e) => {
            println!("  Pair check:      FAILED ({e})");
            println!("  Run `skillswap rebuild` to replace the pair.");
        }
    }

    Ok(())
}
