// SPDX-License-Identifier: MPL-2.0

//! Name-similarity helpers for "did you mean" diagnostics.

/// Maximum edit distance at which a name is offered as a suggestion.
pub(crate) const SUGGESTION_DISTANCE: usize = 2;

/// Levenshtein distance between `a` and `b`, or `None` when it exceeds
/// `limit`. Comparison is case-insensitive: mistyping case alone should
/// still produce a suggestion.
pub(crate) fn edit_distance(a: &str, b: &str, limit: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().flat_map(char::to_lowercase).collect();
    let b: Vec<char> = b.chars().flat_map(char::to_lowercase).collect();
    if a.len().abs_diff(b.len()) > limit {
        return None;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > limit {
            return None;
        }
        std::mem::swap(&mut previous, &mut current);
    }
    (previous[b.len()] <= limit).then_some(previous[b.len()])
}

/// The best suggestion for `wanted` among `candidates`, if any is within
/// the suggestion distance. Ties pick the candidate that sorts first, so
/// the suggestion is deterministic.
pub(crate) fn best_match<'a>(
    wanted: &str,
    candidates: impl Iterator<Item = &'a str>,
) -> Option<&'a str> {
    candidates
        .filter(|candidate| *candidate != wanted)
        .filter_map(|candidate| {
            edit_distance(wanted, candidate, SUGGESTION_DISTANCE)
                .map(|distance| (distance, candidate))
        })
        .min_by_key(|(distance, candidate)| (*distance, candidate.to_string()))
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(edit_distance("Utils", "Utils", 2), Some(0));
        assert_eq!(edit_distance("Utils", "Util", 2), Some(1));
        assert_eq!(edit_distance("Utils", "Utlis", 2), Some(2));
        assert_eq!(edit_distance("Utils", "Networking", 2), None);
    }

    #[test]
    fn comparison_ignores_case() {
        assert_eq!(edit_distance("utils", "Utils", 2), Some(0));
    }

    #[test]
    fn best_match_prefers_closest_then_alphabetical() {
        let candidates = ["Utilz", "Utils2", "Networking"];
        assert_eq!(
            best_match("Utils", candidates.iter().copied()),
            Some("Utils2")
        );
    }
}
