// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared type/interface registry.
//!
//! Interface definitions are project-owned: they outlive the agent that
//! registered them, and later registrations under the same name overwrite
//! earlier ones. Lookup misses come back with a deterministic "similar
//! names" list so an agent that misspells `UserProfile` still finds it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered interface or type definition, discoverable across agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub definition: String,
    pub registered_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl InterfaceRecord {
    pub fn new(registered_by: &str, definition: &str, file_path: Option<&str>) -> Self {
        Self {
            definition: definition.to_string(),
            registered_by: registered_by.to_string(),
            file_path: file_path.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Maximum edit distance for a name to count as similar.
const SIMILAR_MAX_DISTANCE: usize = 3;

/// Candidates for a missed interface lookup.
///
/// A registered name is similar when its lowercase form is within
/// Levenshtein distance 3 of the query, or shares a 3-gram with it. Results
/// are ordered by ascending distance, then lexicographically, so the list is
/// deterministic.
pub fn similar_names<'a>(query: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let needle = query.to_lowercase();
    let mut scored: Vec<(usize, String)> = names
        .into_iter()
        .filter_map(|name| {
            let candidate = name.to_lowercase();
            let distance = levenshtein(&needle, &candidate);
            if distance <= SIMILAR_MAX_DISTANCE || shares_trigram(&needle, &candidate) {
                Some((distance, name.to_string()))
            } else {
                None
            }
        })
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, name)| name).collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn shares_trigram(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    a.windows(3).any(|gram| b.windows(3).any(|other| gram == other))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_edges() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("userprofile", "userprofil"), 1);
    }

    #[test]
    fn near_misses_are_similar() {
        let names = ["UserProfile", "UserSettings", "OrderItem"];
        let similar = similar_names("UserProfil", names);
        assert_eq!(similar[0], "UserProfile");
        assert!(!similar.contains(&"OrderItem".to_string()));
    }

    #[test]
    fn trigram_overlap_catches_distant_names() {
        // Edit distance is far above 3, but "profile" overlaps.
        let names = ["SharedUserProfileRecord"];
        let similar = similar_names("profile", names);
        assert_eq!(similar, vec!["SharedUserProfileRecord".to_string()]);
    }

    #[test]
    fn ordering_is_distance_then_lexicographic() {
        let names = ["Cart", "Card", "Carp", "Cartography"];
        let similar = similar_names("Cart", names);
        // Distance 0 first, then the distance-1 names alphabetically.
        assert_eq!(similar[0], "Cart");
        assert_eq!(&similar[1..3], ["Card".to_string(), "Carp".to_string()]);
    }

    #[test]
    fn unrelated_names_are_excluded() {
        let names = ["PaymentGateway"];
        assert!(similar_names("UserProfile", names).is_empty());
    }
}
