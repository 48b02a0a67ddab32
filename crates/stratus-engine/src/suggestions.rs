//! Fuzzy matching for "did you mean" hints

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Suggestion result with confidence scoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
}

/// Find closest matches from a list of candidates
pub fn find_closest_matches(input: &str, candidates: &[&str], max_results: usize) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = strsim::levenshtein(input, candidate);
            if distance <= MAX_SUGGESTION_DISTANCE && distance > 0 {
                Some(Suggestion {
                    text: candidate.to_string(),
                    distance,
                })
            } else {
                None
            }
        })
        .collect();

    suggestions.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.text.cmp(&b.text)));
    suggestions.truncate(max_results);
    suggestions
}

/// Hint for an unknown key, listing what is available when nothing is close
pub fn suggest_key(input: &str, available: &[&str]) -> Option<String> {
    if available.is_empty() {
        return None;
    }

    let matches = find_closest_matches(input, available, 2);
    if matches.is_empty() {
        Some(format!("Available: {}", available.join(", ")))
    } else {
        let names: Vec<String> = matches.iter().map(|m| format!("`{}`", m.text)).collect();
        Some(format!("Did you mean {}?", names.join(" or ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_closest_matches() {
        let matches = find_closest_matches(
            "cluster_isuer",
            &["cluster_issuer", "cluster_name", "cluster_worker_role"],
            3,
        );
        assert_eq!(matches[0].text, "cluster_issuer");
        assert_eq!(matches[0].distance, 1);
    }

    #[test]
    fn test_exact_match_is_not_a_suggestion() {
        assert!(find_closest_matches("vpc_id", &["vpc_id"], 3).is_empty());
    }

    #[test]
    fn test_suggest_key_lists_available() {
        let hint = suggest_key("completely_different", &["vpc_id", "vpc_cidr"]).unwrap();
        assert_eq!(hint, "Available: vpc_id, vpc_cidr");

        let hint = suggest_key("vpc_ids", &["vpc_id", "vpc_cidr"]).unwrap();
        assert_eq!(hint, "Did you mean `vpc_id` or `vpc_cidr`?");
    }
}
