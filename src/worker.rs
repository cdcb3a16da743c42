//! Chunk worker.
//!
//! A worker scores every candidate pair of one chunk in isolation. It shares
//! nothing mutable with other workers; the only cross-thread input is a
//! read-only abort flag the scheduler raises on fail-fast or timeout.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::alignment::Match;
use crate::entity::{CandidatePair, Entity};
use crate::error::DataError;
use crate::similarity::{best_label_pair, LabelScorer};

/// Upper bound on label length, in characters.
pub const MAX_LABEL_CHARS: usize = 16 * 1024;

/// Default cap on data errors kept per chunk.
pub const DEFAULT_MAX_RECORDED_ERRORS: usize = 64;

/// Result of scoring one chunk.
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    /// One match per qualifying entity pair.
    pub matches: Vec<Match>,
    /// Pairs excluded because of malformed labels.
    pub skipped_pairs: u64,
    /// The first data errors met, up to the recording cap.
    pub data_errors: Vec<DataError>,
    /// Pairs fully scored (including those that did not match).
    pub pairs_scored: u64,
    /// True if the abort flag stopped the chunk before its end.
    pub aborted: bool,
}

/// Per-chunk scoring parameters.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions<'f> {
    /// Minimum score for a match, inclusive.
    pub threshold: f64,
    /// Cap on `WorkerOutput::data_errors`.
    pub max_recorded_errors: usize,
    /// Checked before each pair; when raised the chunk stops early.
    pub abort: Option<&'f AtomicBool>,
}

impl WorkerOptions<'_> {
    /// Options with the given threshold, the default error cap and no abort flag.
    #[must_use]
    pub const fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            max_recorded_errors: DEFAULT_MAX_RECORDED_ERRORS,
            abort: None,
        }
    }
}

/// Scores one chunk of candidate pairs.
///
/// For each pair every label combination is scored; if the best score is at
/// or above the threshold one [`Match`] carrying that score is emitted.
/// Entities without labels never match and are not errors.
pub fn process_chunk<S: LabelScorer + ?Sized>(
    chunk: &[CandidatePair<'_>],
    threshold: f64,
    scorer: &S,
) -> WorkerOutput {
    process_chunk_with(chunk, scorer, WorkerOptions::with_threshold(threshold))
}

/// [`process_chunk`] with explicit options.
pub fn process_chunk_with<S: LabelScorer + ?Sized>(
    chunk: &[CandidatePair<'_>],
    scorer: &S,
    options: WorkerOptions<'_>,
) -> WorkerOutput {
    let mut out = WorkerOutput::default();

    for pair in chunk {
        if options.abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            out.aborted = true;
            break;
        }

        if let Err(err) = validate_entity(pair.source).and_then(|()| validate_entity(pair.target)) {
            debug!(
                source = pair.source.iri(),
                target = pair.target.iri(),
                error = %err,
                "skipping candidate pair"
            );
            out.skipped_pairs += 1;
            if out.data_errors.len() < options.max_recorded_errors {
                out.data_errors.push(err);
            }
            continue;
        }

        out.pairs_scored += 1;
        let best = best_label_pair(scorer, pair.source.labels(), pair.target.labels());
        if let Some(best) = best.filter(|b| b.score >= options.threshold) {
            out.matches
                .push(Match::new(pair.source.iri(), pair.target.iri(), best.score));
        }
    }

    out
}

/// Checks every label of an entity.
///
/// # Errors
/// `DataError::NonStringLabel` if the loader saw a label value that is not a
/// string; `DataError::ControlCharacter` for control characters other than
/// tab, CR and LF; `DataError::LabelTooLong` past [`MAX_LABEL_CHARS`].
pub fn validate_entity(entity: &Entity) -> Result<(), DataError> {
    if let Some(found) = entity.malformed_labels().first() {
        return Err(DataError::NonStringLabel {
            iri: entity.iri().to_string(),
            found: found.clone(),
        });
    }
    for label in entity.labels() {
        validate_label(entity.iri(), label)?;
    }
    Ok(())
}

fn validate_label(iri: &str, label: &str) -> Result<(), DataError> {
    let mut length = 0usize;
    for (position, c) in label.chars().enumerate() {
        if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
            return Err(DataError::ControlCharacter {
                iri: iri.to_string(),
                code: u32::from(c),
                position,
            });
        }
        length = position + 1;
    }
    if length > MAX_LABEL_CHARS {
        return Err(DataError::LabelTooLong {
            iri: iri.to_string(),
            length,
            max_length: MAX_LABEL_CHARS,
        });
    }
    Ok(())
}
