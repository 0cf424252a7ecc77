//! Deterministic object naming (spec §4.2): "`<workflow>-<stage>-<step>`,
//! truncated if necessary and suffix-hashed to remain unique."

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const MAX_NAME_LEN: usize = 63;
const HASH_SUFFIX_LEN: usize = 8;

#[must_use]
pub fn bundle_name(workflow: &str, stage: &str, step: &str) -> String {
    let full = format!("{workflow}-{stage}-{step}");
    if full.len() <= MAX_NAME_LEN {
        return full;
    }
    let mut hasher = DefaultHasher::new();
    full.hash(&mut hasher);
    let suffix = format!("{:x}", hasher.finish());
    let suffix = &suffix[..HASH_SUFFIX_LEN.min(suffix.len())];
    let keep = MAX_NAME_LEN - suffix.len() - 1;
    let truncated: String = full.chars().take(keep).collect();
    format!("{}-{}", truncated.trim_end_matches('-'), suffix)
}

#[must_use]
pub fn repo_secret_name(workflow: &str) -> String {
    format!("repo-{workflow}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_pass_through_unchanged() {
        assert_eq!(bundle_name("pipeline", "train", "sarimax"), "pipeline-train-sarimax");
    }

    #[test]
    fn long_names_are_truncated_and_hash_suffixed() {
        let long_step = "a".repeat(100);
        let name = bundle_name("pipeline", "train", &long_step);
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.starts_with("pipeline-train-a"));
    }

    #[test]
    fn truncation_is_deterministic() {
        let long_step = "b".repeat(100);
        let first = bundle_name("pipeline", "train", &long_step);
        let second = bundle_name("pipeline", "train", &long_step);
        assert_eq!(first, second);
    }
}
