use serde::Serialize;

use super::describe::DescriptionGenerator;
use super::embed::EmbeddingFetcher;
use crate::index::{l2_normalize, FlatIndex};

/// One ranked neighbour of a query term.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkillMatch {
    pub skill: String,
    pub similarity: f32,
    /// 1-based, best first.
    pub rank: usize,
}

/// Describe and embed `term` the same way indexed skills were, then return
/// its `min(top_k, index.len())` nearest skills.
///
/// `manifest` must be the manifest saved with `index`; rows are named by
/// position. Any failure on the query side yields no results.
pub async fn query(
    describer: &DescriptionGenerator,
    fetcher: &EmbeddingFetcher,
    term: &str,
    index: &FlatIndex,
    manifest: &[String],
    top_k: usize,
) -> Vec<SkillMatch> {
    let term = term.trim();
    if term.is_empty() || top_k == 0 || index.is_empty() {
        return Vec::new();
    }
    tracing::info!(term = %term, top_k, "querying similar skills");

    let description = describer.describe_one(term).await;
    let batch = fetcher
        .embed_all(&[(term.to_string(), description)], 1)
        .await;
    if batch.is_empty() {
        tracing::error!(term = %term, "failed to generate query embedding");
        return Vec::new();
    }

    let query_vector = l2_normalize(&batch.matrix.row(0).to_vec());
    if query_vector.len() != index.dimension() {
        tracing::error!(
            query_dimension = query_vector.len(),
            index_dimension = index.dimension(),
            "query embedding does not fit the index"
        );
        return Vec::new();
    }

    index
        .search(&query_vector, top_k)
        .into_iter()
        .filter_map(|(row, similarity)| manifest.get(row).map(|skill| (skill, similarity)))
        .enumerate()
        .map(|(i, (skill, similarity))| SkillMatch {
            skill: skill.clone(),
            similarity,
            rank: i + 1,
        })
        .collect()
}
