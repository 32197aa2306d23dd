//! Skill description generation.
//!
//! Skills are described in batches with one generation call per batch. The
//! free-text reply is parsed line by line and each `N. Label: description`
//! record is assigned to a batch member through a [`LabelMatcher`]. Skills the
//! batch call did not cover (failed call, or unmatched after parsing) fall back
//! to one small call each, and a failed single call degrades to the skill name
//! itself, so [`DescriptionGenerator::describe`] is always total.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{GenerateRequest, GenerationOptions, InferenceBackend};

/// Decides which batch member a parsed label refers to.
pub trait LabelMatcher: Send + Sync {
    /// Index into `batch` of the matched skill, if any.
    fn match_label(&self, label: &str, batch: &[String]) -> Option<usize>;
}

/// Case-insensitive containment in either direction; first batch member wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl LabelMatcher for SubstringMatcher {
    fn match_label(&self, label: &str, batch: &[String]) -> Option<usize> {
        let label = label.to_lowercase();
        batch.iter().position(|skill| {
            let skill = skill.to_lowercase();
            label.contains(&skill) || skill.contains(&label)
        })
    }
}

/// Case-insensitive exact match first, then [`SubstringMatcher`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactThenSubstring;

impl LabelMatcher for ExactThenSubstring {
    fn match_label(&self, label: &str, batch: &[String]) -> Option<usize> {
        let folded = label.to_lowercase();
        batch
            .iter()
            .position(|skill| skill.to_lowercase() == folded)
            .or_else(|| SubstringMatcher.match_label(label, batch))
    }
}

/// Split one reply line into `(label, description)` if it looks like a
/// numbered record.
fn parse_record(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if !line.chars().take(5).any(|c| c.is_ascii_digit()) {
        return None;
    }
    let (head, description) = line.split_once(':')?;
    let label = match head.split_once('.') {
        Some((_, rest)) => rest,
        None => head,
    };
    let label = label.trim().trim_matches(|c| c == '[' || c == ']').trim();
    let description = description.trim();
    if label.is_empty() || description.is_empty() {
        return None;
    }
    Some((label, description))
}

/// Parse a batch reply into descriptions keyed by batch member.
///
/// A skill keeps the first description assigned to it.
pub fn parse_batch_response(
    response: &str,
    batch: &[String],
    matcher: &dyn LabelMatcher,
) -> HashMap<String, String> {
    let mut parsed = HashMap::new();
    for (label, description) in response.lines().filter_map(parse_record) {
        if let Some(idx) = matcher.match_label(label, batch) {
            parsed
                .entry(batch[idx].clone())
                .or_insert_with(|| description.to_string());
        }
    }
    parsed
}

fn batch_prompt(batch: &[String]) -> String {
    let listing = batch
        .iter()
        .enumerate()
        .map(|(i, skill)| format!("{}. {skill}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Provide brief descriptions for these skills (one sentence each):\n{listing}\n\n\
         Format your response as:\n1. [Skill]: [Description]\n2. [Skill]: [Description]\netc."
    )
}

fn single_prompt(skill: &str) -> String {
    format!("Describe the skill '{skill}' in one sentence.")
}

const BATCH_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.1,
    num_predict: 200,
    top_k: 3,
    top_p: Some(0.8),
};

const SINGLE_OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.1,
    num_predict: 30,
    top_k: 3,
    top_p: None,
};

/// Generates descriptions through the backend's text-generation model.
pub struct DescriptionGenerator {
    backend: Arc<dyn InferenceBackend>,
    model: String,
    matcher: Box<dyn LabelMatcher>,
    batch_timeout: Duration,
    single_timeout: Duration,
}

impl DescriptionGenerator {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        model: impl Into<String>,
        batch_timeout: Duration,
        single_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            matcher: Box::new(ExactThenSubstring),
            batch_timeout,
            single_timeout,
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn LabelMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Describe every skill. Batches run one after another.
    pub async fn describe(&self, skills: &[String], batch_size: usize) -> HashMap<String, String> {
        let batch_size = batch_size.max(1);
        let total_batches = skills.len().div_ceil(batch_size);
        let started = Instant::now();
        let mut descriptions = HashMap::with_capacity(skills.len());

        for (n, batch) in skills.chunks(batch_size).enumerate() {
            tracing::info!(batch = n + 1, total = total_batches, "generating descriptions");

            let request = GenerateRequest::new(&self.model, batch_prompt(batch), BATCH_OPTIONS);
            match self.backend.generate(&request, self.batch_timeout).await {
                Ok(reply) => {
                    let parsed = parse_batch_response(reply.trim(), batch, self.matcher.as_ref());
                    tracing::debug!(
                        parsed = parsed.len(),
                        batch_len = batch.len(),
                        "parsed batch descriptions"
                    );
                    descriptions.extend(parsed);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        batch = n + 1,
                        "batch description generation failed"
                    );
                }
            }

            for skill in batch {
                if !descriptions.contains_key(skill) {
                    tracing::warn!(skill = %skill, "missing description, generating individually");
                    let description = self.describe_one(skill).await;
                    descriptions.insert(skill.clone(), description);
                }
            }
        }

        tracing::info!(
            skills = skills.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "description generation completed"
        );
        descriptions
    }

    /// Describe a single skill; any failure yields the skill itself.
    pub async fn describe_one(&self, skill: &str) -> String {
        let request = GenerateRequest::new(&self.model, single_prompt(skill), SINGLE_OPTIONS);
        match self.backend.generate(&request, self.single_timeout).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    skill.to_string()
                } else {
                    reply.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(skill = %skill, error = %e, "single description generation failed");
                skill.to_string()
            }
        }
    }
}
