//! Ticket id extraction from free text (commit messages, PR titles/bodies)

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Jira-style keys: project prefix, dash, number (e.g. `PAY-1234`)
static TICKET_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][A-Z0-9]+-\d+\b").expect("TICKET_ID regex should compile")
});

/// Distinct ticket ids mentioned in `text`, sorted
pub fn extract_ticket_ids(text: &str) -> BTreeSet<String> {
    TICKET_ID
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_and_dedupes() {
        let ids = extract_ticket_ids("PAY-12: fix rounding (see PAY-12, CORE-7)");
        let ids: Vec<_> = ids.into_iter().collect();
        assert_eq!(ids, vec!["CORE-7", "PAY-12"]);
    }

    #[test]
    fn test_ignores_lowercase_and_partial_matches() {
        let ids: Vec<_> = extract_ticket_ids("pay-12 and X-1 and UTF-8")
            .into_iter()
            .collect();
        // single-letter keys are too noisy; encodings look like keys and pass
        assert_eq!(ids, vec!["UTF-8"]);
        assert!(extract_ticket_ids("no tickets here").is_empty());
        assert!(extract_ticket_ids("ABC-12x").is_empty());
    }

    #[test]
    fn test_digits_in_project_key() {
        let ids = extract_ticket_ids("Merge S3-42 into main");
        assert!(ids.contains("S3-42"));
    }
}
