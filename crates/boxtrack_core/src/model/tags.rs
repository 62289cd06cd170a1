//! Tag normalization shared by boxes and items.
//!
//! # Invariants
//! - Stored tags are trimmed, lowercase, non-empty and deduplicated.
//! - Normalized tag lists are sorted, so insertion order never matters.

use std::collections::BTreeSet;

/// Normalizes one tag value; blank input yields `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut unique = BTreeSet::new();
    for tag in tags {
        if let Some(value) = normalize_tag(tag) {
            unique.insert(value);
        }
    }
    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::normalize_tags;

    #[test]
    fn normalize_tags_dedupes_case_insensitively_and_drops_blanks() {
        let tags = vec![
            " Winter ".to_string(),
            "winter".to_string(),
            "".to_string(),
            "Cables".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["cables", "winter"]);
    }
}
