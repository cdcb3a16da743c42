//! Matches and match sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A qualifying entity pair and its best label-pair score.
///
/// Matches are direction-sensitive: `source` always comes from the first
/// graph and `target` from the second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// IRI from the first graph.
    pub source: String,
    /// IRI from the second graph.
    pub target: String,
    /// Best label-pair score, in [0, 1].
    pub score: f64,
}

impl Match {
    /// Creates a match.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, score: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            score,
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> = <{}> ({:.3})", self.source, self.target, self.score)
    }
}

/// Set of matches keyed by `(source, target)`.
///
/// Each entity pair appears at most once. Iteration follows key order, which
/// is deterministic but carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSet {
    matches: BTreeMap<(String, String), f64>,
}

impl MatchSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a match. If the pair is already present the higher score is kept.
    pub fn insert(&mut self, m: Match) {
        let score = self.matches.entry((m.source, m.target)).or_insert(m.score);
        if m.score > *score {
            *score = m.score;
        }
    }

    /// Number of entity pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns true if no pair matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Returns true if the `(source, target)` pair is present.
    #[must_use]
    pub fn contains_pair(&self, source: &str, target: &str) -> bool {
        self.matches
            .contains_key(&(source.to_string(), target.to_string()))
    }

    /// Score recorded for a pair.
    #[must_use]
    pub fn score(&self, source: &str, target: &str) -> Option<f64> {
        self.matches
            .get(&(source.to_string(), target.to_string()))
            .copied()
    }

    /// Iterates `(source, target, score)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.matches
            .iter()
            .map(|((s, t), score)| (s.as_str(), t.as_str(), *score))
    }

    /// Iterates the `(source, target)` pairs in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.matches.keys().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    /// Returns true if every pair in `self` is also in `other` (scores ignored).
    #[must_use]
    pub fn is_subset_of(&self, other: &MatchSet) -> bool {
        self.matches.keys().all(|k| other.matches.contains_key(k))
    }

    /// Lowest score in the set.
    #[must_use]
    pub fn min_score(&self) -> Option<f64> {
        self.matches.values().copied().reduce(f64::min)
    }

    /// Owned matches in key order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Match> {
        self.iter().map(|(s, t, score)| Match::new(s, t, score)).collect()
    }

    /// Stable hash over the sorted pairs and scores.
    ///
    /// Two runs over the same input produce the same fingerprint regardless
    /// of parallelism.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (source, target, score) in self.iter() {
            hasher.update(source.as_bytes());
            hasher.update(&[0]);
            hasher.update(target.as_bytes());
            hasher.update(&[0]);
            hasher.update(&score.to_bits().to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl FromIterator<Match> for MatchSet {
    fn from_iter<I: IntoIterator<Item = Match>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Match> for MatchSet {
    fn extend<I: IntoIterator<Item = Match>>(&mut self, iter: I) {
        for m in iter {
            self.insert(m);
        }
    }
}

impl IntoIterator for MatchSet {
    type Item = Match;
    type IntoIter = std::iter::Map<
        std::collections::btree_map::IntoIter<(String, String), f64>,
        fn(((String, String), f64)) -> Match,
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn to_match(((source, target), score): ((String, String), f64)) -> Match {
            Match {
                source,
                target,
                score,
            }
        }
        self.matches
            .into_iter()
            .map(to_match as fn(((String, String), f64)) -> Match)
    }
}

impl Serialize for MatchSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_vec())
    }
}

impl<'de> Deserialize<'de> for MatchSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let matches = Vec::<Match>::deserialize(deserializer)?;
        Ok(matches.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_pair_keeps_highest_score() {
        let mut set = MatchSet::new();
        set.insert(Match::new("a", "b", 0.85));
        set.insert(Match::new("a", "b", 0.95));
        set.insert(Match::new("a", "b", 0.9));
        assert_eq!(set.len(), 1);
        assert_eq!(set.score("a", "b"), Some(0.95));
    }

    #[test]
    fn pairs_are_direction_sensitive() {
        let set: MatchSet = vec![Match::new("a", "b", 1.0)].into_iter().collect();
        assert!(set.contains_pair("a", "b"));
        assert!(!set.contains_pair("b", "a"));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let x: MatchSet = vec![Match::new("a", "b", 1.0), Match::new("c", "d", 0.9)]
            .into_iter()
            .collect();
        let y: MatchSet = vec![Match::new("c", "d", 0.9), Match::new("a", "b", 1.0)]
            .into_iter()
            .collect();
        assert_eq!(x, y);
        assert_eq!(x.fingerprint(), y.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let x: MatchSet = vec![Match::new("a", "b", 1.0)].into_iter().collect();
        let y: MatchSet = vec![Match::new("a", "b", 0.9)].into_iter().collect();
        assert_ne!(x.fingerprint(), y.fingerprint());
        assert_ne!(x.fingerprint(), MatchSet::new().fingerprint());
    }

    #[test]
    fn subset_ignores_scores() {
        let small: MatchSet = vec![Match::new("a", "b", 0.9)].into_iter().collect();
        let big: MatchSet = vec![Match::new("a", "b", 1.0), Match::new("c", "d", 0.8)]
            .into_iter()
            .collect();
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert_eq!(big.min_score(), Some(0.8));
    }

    #[test]
    fn json_roundtrip_keeps_scores() {
        let set: MatchSet = vec![Match::new("a", "b", 0.875)].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains("0.875"));
        let back: MatchSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn into_iter_yields_owned_matches() {
        let set: MatchSet = vec![Match::new("x", "y", 0.8)].into_iter().collect();
        let all: Vec<Match> = set.into_iter().collect();
        assert_eq!(all, vec![Match::new("x", "y", 0.8)]);
    }
}
