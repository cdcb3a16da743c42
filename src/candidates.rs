//! Candidate generation.

use crate::entity::{CandidatePair, Entity};

/// Full cross product of two entity lists.
///
/// Source entities are the outer dimension, target entities the inner one.
/// Downstream stages must not rely on this order for correctness; it only
/// makes chunk contents reproducible.
#[must_use]
pub fn generate<'a>(source: &'a [Entity], target: &'a [Entity]) -> Vec<CandidatePair<'a>> {
    let mut pairs = Vec::with_capacity(source.len().saturating_mul(target.len()));
    for a in source {
        for b in target {
            pairs.push(CandidatePair::new(a, b));
        }
    }
    pairs
}
