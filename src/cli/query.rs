use anyhow::Result;

use skillswap::config::SkillswapConfig;

/// Print the skills most similar to `term`.
pub async fn query(config: &SkillswapConfig, term: &str, top_k: Option<usize>) -> Result<()> {
    let pipeline = super::build_pipeline(config)?;
    let top_k = top_k.unwrap_or(config.retrieval.default_top_k);

    let matches = pipeline.query_similar(term, top_k).await;
    if matches.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Skills similar to '{term}':\n");
    for m in &matches {
        println!("  {}. {} ({:.4})", m.rank, m.skill, m.similarity);
    }
    Ok(())
}
