//! CLI `add-skill` command: record an offered skill, then rebuild.

use anyhow::{Context, Result};

use skillswap::config::SkillswapConfig;
use skillswap::db;

pub struct AddSkillArgs {
    pub user: String,
    pub location: Option<String>,
    pub offered: String,
    pub wanted: Option<String>,
}

/// Insert the skill row and rebuild synchronously, as every skill mutation does.
pub async fn add_skill(config: &SkillswapConfig, args: AddSkillArgs) -> Result<()> {
    let (user_id, skill_id) = {
        let conn = db::open_database(config.resolved_db_path()).context("failed to open database")?;
        let user_id = db::ensure_user(&conn, &args.user, args.location.as_deref())
            .context("failed to look up user")?;
        let skill_id = db::insert_skill(&conn, user_id, &args.offered, args.wanted.as_deref())?;
        (user_id, skill_id)
    };
    tracing::info!(user_id, skill_id, skill = %args.offered, "added skill");
    println!("Added skill '{}' (id {skill_id}) for {}.", args.offered, args.user);

    let pipeline = super::build_pipeline(config)?;
    super::rebuild::run(config, &pipeline).await
}
