use std::collections::HashSet;

/// Trim, drop blanks, and keep the first literal spelling of each
/// case-insensitive skill, in first-seen order.
pub fn dedupe<S: AsRef<str>>(raw_skills: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for raw in raw_skills {
        let skill = raw.as_ref().trim();
        if skill.is_empty() {
            continue;
        }
        if seen.insert(skill.to_lowercase()) {
            unique.push(skill.to_string());
        }
    }

    unique
}
