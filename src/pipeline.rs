//! End-to-end alignment task: load, match, persist, evaluate.
//!
//! [`AlignmentTask`] handles one pair of graphs. [`AlignmentBatch`] runs a
//! list of pairs read from a JSON file, one after the other, and
//! [`AlignmentTask::compare_sequential`] times a single-worker run against
//! the configured pool on the same loaded graphs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::AlignConfig;
use crate::error::{AlignResult, ExecutionError, LoadError, ValidationError};
use crate::evaluation::{evaluate, EvaluationResult};
use crate::loader::{load_pair, FileLoader, GraphLoader};
use crate::scheduler::{CancelToken, RunReport, RunStatus, Scheduler};
use crate::serializer::{read_file, write_file, AlignmentFormat};

/// Wall-clock time spent in each stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    /// Loading both graphs.
    pub load: Duration,
    /// Scheduler run.
    pub matching: Duration,
    /// Writing the alignment, if an output was set and the run completed.
    pub write: Option<Duration>,
    /// Evaluation, if a reference was set and the run completed.
    pub evaluate: Option<Duration>,
}

/// Result of an [`AlignmentTask`].
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    /// Scheduler report.
    pub report: RunReport,
    /// Present when a reference was given and the run completed.
    pub evaluation: Option<EvaluationResult>,
    /// Entities loaded from the source graph.
    pub source_entities: usize,
    /// Entities loaded from the target graph.
    pub target_entities: usize,
    /// Per-stage wall-clock time.
    pub timings: StageTimings,
}

/// A single-worker run and a pooled run over the same loaded graphs.
#[derive(Debug, Clone)]
pub struct ParallelComparison {
    /// Run with parallelism 1.
    pub sequential: RunReport,
    /// Run with the configured parallelism.
    pub parallel: RunReport,
    /// Sequential result scored against the reference, if one was set.
    pub sequential_evaluation: Option<EvaluationResult>,
    /// Parallel result scored against the reference, if one was set.
    pub parallel_evaluation: Option<EvaluationResult>,
    /// Entities loaded from the source graph.
    pub source_entities: usize,
    /// Entities loaded from the target graph.
    pub target_entities: usize,
}

impl ParallelComparison {
    /// Returns true if both runs produced the same match set fingerprint.
    #[must_use]
    pub fn results_agree(&self) -> bool {
        self.sequential.matches.fingerprint() == self.parallel.matches.fingerprint()
    }

    /// Sequential time divided by parallel time.
    #[must_use]
    pub fn speedup(&self) -> f64 {
        let parallel = self.parallel.elapsed.as_secs_f64().max(f64::EPSILON);
        self.sequential.elapsed.as_secs_f64() / parallel
    }
}

/// One batch alignment of two graph files.
#[derive(Debug, Clone)]
pub struct AlignmentTask {
    /// First graph file.
    pub source: PathBuf,
    /// Second graph file.
    pub target: PathBuf,
    /// Where and how to write the alignment.
    pub output: Option<(PathBuf, AlignmentFormat)>,
    /// Reference alignment to evaluate against.
    pub reference: Option<PathBuf>,
    /// Matching parameters.
    pub config: AlignConfig,
}

impl AlignmentTask {
    /// Task for two graph files with the default configuration.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            output: None,
            reference: None,
            config: AlignConfig::default(),
        }
    }

    /// Persists the match set to `path` after a completed run.
    #[must_use]
    pub fn with_output(mut self, path: impl Into<PathBuf>, format: AlignmentFormat) -> Self {
        self.output = Some((path.into(), format));
        self
    }

    /// Evaluates the match set against a reference alignment. The format
    /// follows the file extension.
    #[must_use]
    pub fn with_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference = Some(path.into());
        self
    }

    /// Replaces the matching parameters.
    #[must_use]
    pub fn with_config(mut self, config: AlignConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs with the file loader and no external cancellation.
    ///
    /// # Errors
    /// Any load, validation, execution or serialization error.
    pub fn run(&self) -> AlignResult<AlignmentOutcome> {
        self.run_with(&FileLoader::new(), CancelToken::new())
    }

    /// Runs with a custom loader and cancellation token.
    ///
    /// A cancelled run is neither persisted nor evaluated.
    ///
    /// # Errors
    /// Any load, validation, execution or serialization error.
    pub fn run_with<L: GraphLoader + ?Sized>(
        &self,
        loader: &L,
        cancel: CancelToken,
    ) -> AlignResult<AlignmentOutcome> {
        self.config.validate()?;
        let mut timings = StageTimings::default();

        let start = Instant::now();
        let (source, target) = load_pair(loader, &self.source, &self.target)?;
        timings.load = start.elapsed();

        let start = Instant::now();
        let scheduler = Scheduler::new(self.config.clone()).with_cancel_token(cancel);
        let report = scheduler.align(&source.entities, &target.entities)?;
        timings.matching = start.elapsed();

        let mut evaluation = None;
        if report.status == RunStatus::Done {
            if let Some((path, format)) = &self.output {
                let start = Instant::now();
                write_file(path, &report.matches, *format)?;
                timings.write = Some(start.elapsed());
            }
            if let Some(path) = &self.reference {
                let start = Instant::now();
                evaluation = Some(evaluate_against(&report, path)?);
                timings.evaluate = Some(start.elapsed());
            }
        } else if self.output.is_some() || self.reference.is_some() {
            warn!(run_id = %report.run_id, "run cancelled, skipping output and evaluation");
        }

        info!(
            load_ms = millis(timings.load),
            matching_ms = millis(timings.matching),
            write_ms = timings.write.map(millis),
            evaluate_ms = timings.evaluate.map(millis),
            "alignment task finished"
        );

        Ok(AlignmentOutcome {
            report,
            evaluation,
            source_entities: source.len(),
            target_entities: target.len(),
            timings,
        })
    }

    /// Loads both graphs once and matches them twice: with a single worker
    /// and with the configured parallelism. The parallel result is written
    /// to the output, and both results are evaluated when a reference is set.
    ///
    /// # Errors
    /// Any load, validation, execution or serialization error;
    /// `ExecutionError::Divergence` if the two match sets differ.
    pub fn compare_sequential(&self) -> AlignResult<ParallelComparison> {
        self.compare_sequential_with(&FileLoader::new())
    }

    /// [`AlignmentTask::compare_sequential`] with a custom loader.
    ///
    /// # Errors
    /// See [`AlignmentTask::compare_sequential`].
    pub fn compare_sequential_with<L: GraphLoader + ?Sized>(
        &self,
        loader: &L,
    ) -> AlignResult<ParallelComparison> {
        self.config.validate()?;
        let (source, target) = load_pair(loader, &self.source, &self.target)?;

        let sequential = Scheduler::new(self.config.clone().with_parallelism(1))
            .align(&source.entities, &target.entities)?;
        let parallel = Scheduler::new(self.config.clone()).align(&source.entities, &target.entities)?;

        let sequential_fingerprint = sequential.matches.fingerprint();
        let parallel_fingerprint = parallel.matches.fingerprint();
        info!(
            sequential_ms = millis(sequential.elapsed),
            parallel_ms = millis(parallel.elapsed),
            workers = parallel.workers,
            agree = sequential_fingerprint == parallel_fingerprint,
            "compared sequential and parallel runs"
        );
        if sequential_fingerprint != parallel_fingerprint {
            return Err(ExecutionError::Divergence {
                sequential: sequential_fingerprint,
                parallel: parallel_fingerprint,
            }
            .into());
        }

        if let Some((path, format)) = &self.output {
            write_file(path, &parallel.matches, *format)?;
        }
        let (sequential_evaluation, parallel_evaluation) = match &self.reference {
            Some(path) => (
                Some(evaluate_against(&sequential, path)?),
                Some(evaluate_against(&parallel, path)?),
            ),
            None => (None, None),
        };

        Ok(ParallelComparison {
            sequential,
            parallel,
            sequential_evaluation,
            parallel_evaluation,
            source_entities: source.len(),
            target_entities: target.len(),
        })
    }
}

/// One pair of a batch file.
///
/// Relative paths are resolved against the batch file's directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchEntry {
    /// First graph file.
    pub source: PathBuf,
    /// Second graph file.
    pub target: PathBuf,
    /// Alignment output; the format follows the extension.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Reference alignment to evaluate against.
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

/// Several alignments run one after the other with shared parameters.
#[derive(Debug, Clone)]
pub struct AlignmentBatch {
    /// Pairs in run order.
    pub entries: Vec<BatchEntry>,
    /// Matching parameters for every pair.
    pub config: AlignConfig,
}

impl AlignmentBatch {
    /// Batch with the default configuration.
    #[must_use]
    pub fn new(entries: Vec<BatchEntry>) -> Self {
        Self {
            entries,
            config: AlignConfig::default(),
        }
    }

    /// Reads a JSON array of [`BatchEntry`] records.
    ///
    /// # Errors
    /// `LoadError::Io` or `LoadError::Parse` naming the batch file.
    pub fn from_json_file(path: &Path) -> AlignResult<Self> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<BatchEntry> = serde_json::from_slice(&bytes).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let entries = entries
            .into_iter()
            .map(|entry| BatchEntry {
                source: base.join(entry.source),
                target: base.join(entry.target),
                output: entry.output.map(|p| base.join(p)),
                reference: entry.reference.map(|p| base.join(p)),
            })
            .collect::<Vec<_>>();
        info!(path = %path.display(), pairs = entries.len(), "loaded batch file");
        Ok(Self::new(entries))
    }

    /// Replaces the matching parameters.
    #[must_use]
    pub fn with_config(mut self, config: AlignConfig) -> Self {
        self.config = config;
        self
    }

    /// One task per entry, in order.
    pub fn tasks(&self) -> impl Iterator<Item = AlignmentTask> + '_ {
        self.entries.iter().map(|entry| {
            let mut task = AlignmentTask::new(&entry.source, &entry.target).with_config(self.config.clone());
            if let Some(output) = &entry.output {
                task = task.with_output(output, AlignmentFormat::from_path(output));
            }
            if let Some(reference) = &entry.reference {
                task = task.with_reference(reference);
            }
            task
        })
    }

    /// Runs every pair with the file loader.
    ///
    /// # Errors
    /// See [`AlignmentBatch::run_with`].
    pub fn run(&self) -> AlignResult<Vec<AlignmentOutcome>> {
        self.run_with(&FileLoader::new(), CancelToken::new())
    }

    /// Runs every pair in order and stops at the first error. Once the token
    /// is cancelled the remaining pairs report `Cancelled` without scoring.
    ///
    /// # Errors
    /// `ValidationError` for an empty batch or an invalid configuration, and
    /// the first error any pair returns.
    pub fn run_with<L: GraphLoader + ?Sized>(
        &self,
        loader: &L,
        cancel: CancelToken,
    ) -> AlignResult<Vec<AlignmentOutcome>> {
        if self.entries.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "pairs".to_string(),
                reason: "batch lists no graph pairs".to_string(),
            }
            .into());
        }
        self.config.validate()?;

        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(self.entries.len());
        for (index, task) in self.tasks().enumerate() {
            info!(
                index,
                source = %task.source.display(),
                target = %task.target.display(),
                "batch pair"
            );
            outcomes.push(task.run_with(loader, cancel.clone())?);
        }
        info!(pairs = outcomes.len(), elapsed_ms = millis(start.elapsed()), "batch finished");
        Ok(outcomes)
    }
}

fn evaluate_against(report: &RunReport, reference: &Path) -> AlignResult<EvaluationResult> {
    let expected = read_file(reference, AlignmentFormat::from_path(reference))?;
    let result = evaluate(&report.matches, &expected);
    info!(
        precision = result.precision,
        recall = result.recall,
        f_score = result.f_score,
        "evaluated against reference"
    );
    Ok(result)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
