mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skillswap::config::SkillswapConfig;

#[derive(Parser)]
#[command(name = "skillswap", version, about = "Skill-similarity index for skill swapping")]
struct Cli {
    /// Path to a config file (defaults to ~/.skillswap/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the skill index from the database
    Rebuild,
    /// Find skills similar to a term
    Query {
        term: String,
        /// Number of results (defaults to retrieval.default_top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Record an offered skill for a user, then rebuild
    AddSkill {
        /// User name (created if it does not exist)
        #[arg(long)]
        user: String,
        #[arg(long)]
        location: Option<String>,
        /// Skill the user offers
        #[arg(long)]
        offered: String,
        /// Skill the user wants in return
        #[arg(long)]
        wanted: Option<String>,
    },
    /// Check the inference backend, database and index pair
    Doctor,
    /// Serve the HTTP rebuild/query surface
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SkillswapConfig::load_from(path)?,
        None => SkillswapConfig::load()?,
    };

    // Log to stderr so command output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Rebuild => cli::rebuild::rebuild(&config).await?,
        Command::Query { term, k } => cli::query::query(&config, &term, k).await?,
        Command::AddSkill {
            user,
            location,
            offered,
            wanted,
        } => {
            cli::add_skill::add_skill(
                &config,
                cli::add_skill::AddSkillArgs {
                    user,
                    location,
                    offered,
                    wanted,
                },
            )
            .await?
        }
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Serve => skillswap::server::serve(config).await?,
    }

    Ok(())
}
