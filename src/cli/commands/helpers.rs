//! Shared helper functions for CLI commands.

use std::sync::LazyLock;

use regex::Regex;

static REGION_EQUALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sg_uf|region)\s*=\s*([a-z]{2})\b").expect("valid region pattern")
});
static IS_NOT_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bis\s+not\s+null\b").expect("valid null pattern"));
static IS_NULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bis\s+null\b").expect("valid null pattern"));

/// Normalize a user-typed catalog predicate.
///
/// Bare two-letter region codes are quoted and uppercased
/// (`sg_uf = sp` → `REGION = 'SP'`) and null checks are uppercased.
/// Returns `None` for a blank predicate.
pub fn sanitize_filter(raw: &str) -> Option<String> {
    let clause = raw.trim();
    if clause.is_empty() {
        return None;
    }
    let clause = REGION_EQUALS.replace_all(clause, |caps: &regex::Captures<'_>| {
        format!("REGION = '{}'", caps[1].to_uppercase())
    });
    let clause = IS_NOT_NULL.replace_all(&clause, "IS NOT NULL");
    let clause = IS_NULL.replace_all(&clause, "IS NULL");
    Some(clause.into_owned())
}

/// Truncate string to max length, adding "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_region_codes() {
        assert_eq!(
            sanitize_filter("sg_uf = sp").as_deref(),
            Some("REGION = 'SP'")
        );
        assert_eq!(
            sanitize_filter("  region=rj and display_name is not null ").as_deref(),
            Some("REGION = 'RJ' and display_name IS NOT NULL")
        );
        assert_eq!(
            sanitize_filter("region is null").as_deref(),
            Some("region IS NULL")
        );
    }

    #[test]
    fn leaves_quoted_values_alone() {
        assert_eq!(
            sanitize_filter("REGION = 'SP'").as_deref(),
            Some("REGION = 'SP'")
        );
    }

    #[test]
    fn blank_is_no_filter() {
        assert_eq!(sanitize_filter("   "), None);
    }

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("São Paulo", 20), "São Paulo");
        assert_eq!(truncate("Prefeitura de São José", 10), "Prefeit...");
    }
}
