//! DNS-label name normalization (spec §3 invariants, §8 invariant 4).

use regex::Regex;
use std::sync::OnceLock;

const MAX_LABEL_LENGTH: usize = 63;

fn invalid_char_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("valid regex"))
}

/// Normalizes `raw` into a DNS-label: lowercase, any invalid character
/// replaced with `-`, leading/trailing non-alphanumerics stripped, and
/// truncated to 63 characters. Idempotent: `normalize(normalize(n)) ==
/// normalize(n)` for all `n` (spec §8 invariant 4).
#[must_use]
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let replaced = invalid_char_re().replace_all(&lowered, "-").into_owned();
    let trimmed = replaced.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let truncated: String = trimmed.chars().take(MAX_LABEL_LENGTH).collect();
    truncated
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Returns true if `s` is already a valid DNS label per spec §3:
/// `[a-z0-9]([-a-z0-9]*[a-z0-9])?`, length <= 63.
#[must_use]
pub fn is_dns_label(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_LABEL_LENGTH {
        return false;
    }
    let bytes = s.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes
        .iter()
        .all(|&b| is_alnum(b) || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_replaces_invalid_chars() {
        assert_eq!(normalize("My_Step.1"), "my-step-1");
    }

    #[test]
    fn strips_leading_and_trailing_dashes() {
        assert_eq!(normalize("--foo--"), "foo");
        assert_eq!(normalize("_bar_"), "bar");
    }

    #[test]
    fn truncates_to_63_chars() {
        let long = "a".repeat(100);
        assert_eq!(normalize(&long).len(), 63);
    }

    #[test]
    fn idempotent_on_arbitrary_inputs() {
        for raw in ["Train Step!!", "already-normal", "___", "A1B2C3", "-x-"] {
            let once = normalize(raw);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize not idempotent for {raw:?}");
        }
    }

    #[test]
    fn validates_dns_labels() {
        assert!(is_dns_label("sarimax"));
        assert!(is_dns_label("a-1"));
        assert!(!is_dns_label("-leading"));
        assert!(!is_dns_label("trailing-"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label(&"a".repeat(64)));
    }
}
