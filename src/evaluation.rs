//! Evaluation against a reference alignment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alignment::MatchSet;

/// Confusion counts and derived quality measures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Produced pairs found in the reference.
    pub true_positives: usize,
    /// Produced pairs missing from the reference.
    pub false_positives: usize,
    /// Reference pairs that were not produced.
    pub false_negatives: usize,
    /// `tp / (tp + fp)`, or 0.
    pub precision: f64,
    /// `tp / (tp + fn)`, or 0.
    pub recall: f64,
    /// Harmonic mean of precision and recall, or 0.
    pub f_score: f64,
}

impl EvaluationResult {
    /// Derives precision, recall and F-score from the three counts.
    ///
    /// Each ratio is defined as `0.0` when its denominator is zero.
    #[must_use]
    pub fn from_counts(true_positives: usize, false_positives: usize, false_negatives: usize) -> Self {
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f_score,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "precision={:.3} recall={:.3} f_score={:.3} (tp={} fp={} fn={})",
            self.precision,
            self.recall,
            self.f_score,
            self.true_positives,
            self.false_positives,
            self.false_negatives
        )
    }
}

/// Compares a produced match set with a reference.
///
/// Pairs are compared by `(source, target)` only, direction-sensitive.
/// Scores are ignored.
///
/// # Examples
///
/// ```
/// use lexalign::{evaluate, Match, MatchSet};
///
/// let reference: MatchSet = [Match::new("A1", "B1", 1.0), Match::new("A2", "B2", 1.0)]
///     .into_iter()
///     .collect();
/// let produced: MatchSet = [Match::new("A1", "B1", 0.9), Match::new("A3", "B3", 0.85)]
///     .into_iter()
///     .collect();
///
/// let result = evaluate(&produced, &reference);
/// assert_eq!((result.true_positives, result.false_positives, result.false_negatives), (1, 1, 1));
/// assert_eq!(result.f_score, 0.5);
/// ```
#[must_use]
pub fn evaluate(produced: &MatchSet, reference: &MatchSet) -> EvaluationResult {
    let true_positives = produced
        .pairs()
        .filter(|(s, t)| reference.contains_pair(s, t))
        .count();
    let false_positives = produced.len() - true_positives;
    let false_negatives = reference.len() - true_positives;
    EvaluationResult::from_counts(true_positives, false_positives, false_negatives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Match;

    fn set(pairs: &[(&str, &str)]) -> MatchSet {
        pairs.iter().map(|(s, t)| Match::new(*s, *t, 1.0)).collect()
    }

    #[test]
    fn half_right_half_wrong() {
        let reference = set(&[("A1", "B1"), ("A2", "B2")]);
        let produced: MatchSet = vec![Match::new("A1", "B1", 0.9), Match::new("A3", "B3", 0.85)]
            .into_iter()
            .collect();
        let r = evaluate(&produced, &reference);
        assert_eq!(r.true_positives, 1);
        assert_eq!(r.false_positives, 1);
        assert_eq!(r.false_negatives, 1);
        assert_eq!(r.precision, 0.5);
        assert_eq!(r.recall, 0.5);
        assert_eq!(r.f_score, 0.5);
    }

    #[test]
    fn empty_sets_score_zero() {
        let r = evaluate(&MatchSet::new(), &MatchSet::new());
        assert_eq!(r, EvaluationResult::from_counts(0, 0, 0));
        assert_eq!(r.precision, 0.0);
        assert_eq!(r.recall, 0.0);
        assert_eq!(r.f_score, 0.0);
    }

    #[test]
    fn nothing_produced_gives_zero_precision() {
        let r = evaluate(&MatchSet::new(), &set(&[("a", "b")]));
        assert_eq!(r.false_negatives, 1);
        assert_eq!(r.precision, 0.0);
        assert_eq!(r.recall, 0.0);
    }

    #[test]
    fn reversed_pair_is_not_a_hit() {
        let r = evaluate(&set(&[("b", "a")]), &set(&[("a", "b")]));
        assert_eq!(r.true_positives, 0);
        assert_eq!(r.false_positives, 1);
        assert_eq!(r.false_negatives, 1);
    }

    #[test]
    fn perfect_alignment() {
        let s = set(&[("a", "b"), ("c", "d"), ("e", "f")]);
        let r = evaluate(&s, &s);
        assert_eq!(r.f_score, 1.0);
    }

    #[test]
    fn uneven_precision_and_recall() {
        // 2 of 4 produced are right, 2 of 3 reference found.
        let produced = set(&[("a", "1"), ("b", "2"), ("x", "9"), ("y", "8")]);
        let reference = set(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let r = evaluate(&produced, &reference);
        assert_eq!(r.precision, 0.5);
        assert!((r.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((r.f_score - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn display_uses_three_decimals() {
        let r = EvaluationResult::from_counts(1, 2, 0);
        assert_eq!(
            r.to_string(),
            "precision=0.333 recall=1.000 f_score=0.500 (tp=1 fp=2 fn=0)"
        );
    }
}
