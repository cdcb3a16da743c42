//! Parallel scheduler and merger.
//!
//! The scheduler partitions candidate pairs into chunks, hands them to a
//! fixed-size pool of named worker threads over a rendezvous channel, and
//! merges the per-chunk matches into one [`MatchSet`]. Workers borrow the
//! entity data through scoped threads; nothing is copied or mutated.
//!
//! A run moves through `Idle -> Dispatching -> Awaiting -> Merged -> Done`.
//! Cancellation ends in `Cancelled` (a report, flagged incomplete); a worker
//! panic or a timeout ends in `Failed` (an error, never a partial result).

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alignment::MatchSet;
use crate::candidates::generate;
use crate::config::AlignConfig;
use crate::entity::{CandidatePair, Entity};
use crate::error::{AlignError, AlignResult, DataError, ExecutionError};
use crate::partition::partition;
use crate::similarity::{CompositeScorer, LabelScorer};
use crate::worker::{process_chunk_with, WorkerOptions, WorkerOutput};

/// How long the dispatcher waits for an idle worker before re-checking
/// cancellation, failures and the deadline.
const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(5);

const SCORING_STAGE: &str = "scoring";

/// Identifier of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cooperative cancellation signal shared between a caller and a run.
///
/// Once cancelled, no further chunks are dispatched; chunks already taken
/// by a worker run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Created, nothing dispatched yet.
    Idle,
    /// Handing chunks to workers.
    Dispatching,
    /// Job channel closed, waiting for in-flight chunks.
    Awaiting,
    /// Chunk outputs folded into one match set.
    Merged,
    /// Every chunk was scored.
    Done,
    /// Stopped early by the cancel token.
    Cancelled,
    /// A worker failed or the deadline passed.
    Failed,
}

impl RunPhase {
    /// Returns true if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Dispatching)
                | (Self::Dispatching, Self::Awaiting)
                | (Self::Awaiting, Self::Merged)
                | (Self::Merged, Self::Done | Self::Cancelled)
                | (Self::Dispatching | Self::Awaiting, Self::Failed)
        )
    }

    /// Returns true for `Done`, `Cancelled` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Awaiting => "awaiting",
            Self::Merged => "merged",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

struct PhaseTracker {
    run_id: RunId,
    current: RunPhase,
}

impl PhaseTracker {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            current: RunPhase::Idle,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.current.can_advance_to(next),
            "illegal run transition {} -> {}",
            self.current,
            next
        );
        debug!(run_id = %self.run_id, from = %self.current, to = %next, "run phase");
        self.current = next;
    }
}

/// How a run that returned a report ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every chunk was scored.
    Done,
    /// Cancelled before every chunk was dispatched; matches are partial.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of a run that was not aborted by a failure.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier used in this run's log events.
    pub run_id: RunId,
    /// Whether every chunk was scored.
    pub status: RunStatus,
    /// Merged matches of all completed chunks.
    pub matches: MatchSet,
    /// Pairs excluded because of malformed labels.
    pub skipped_pairs: u64,
    /// The first data errors met, in chunk order, up to the configured cap.
    pub data_errors: Vec<DataError>,
    /// Candidate pairs handed to the run.
    pub pairs_total: usize,
    /// Pairs fully scored by completed chunks.
    pub pairs_scored: u64,
    /// Chunks the candidates were split into.
    pub chunks_total: usize,
    /// Chunks scored to the end.
    pub chunks_completed: usize,
    /// Worker threads spawned.
    pub workers: usize,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Time from start to merged result.
    pub elapsed: Duration,
}

impl RunReport {
    /// Returns true if every chunk was scored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Done && self.chunks_completed == self.chunks_total
    }
}

struct ChunkJob<'a> {
    index: usize,
    pairs: Vec<CandidatePair<'a>>,
}

#[derive(Debug, Clone)]
enum ChunkOutcome {
    Completed { index: usize, output: WorkerOutput },
    Failed { index: usize, message: String },
    /// Taken by a worker after cancellation and returned unscored.
    NotStarted { index: usize },
}

impl ChunkOutcome {
    const fn index(&self) -> usize {
        match self {
            Self::Completed { index, .. }
            | Self::Failed { index, .. }
            | Self::NotStarted { index } => *index,
        }
    }

    const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Failed,
    TimedOut,
    Cancelled,
}

impl StopReason {
    /// Keeps the more severe of two reasons.
    fn merge(current: Option<Self>, next: Self) -> Self {
        match (current, next) {
            (Some(Self::Failed), _) | (_, Self::Failed) => Self::Failed,
            (Some(Self::TimedOut), _) | (_, Self::TimedOut) => Self::TimedOut,
            _ => Self::Cancelled,
        }
    }
}

/// Completed chunk outputs folded together in chunk order.
#[derive(Debug, Default, PartialEq)]
struct Merged {
    matches: MatchSet,
    skipped_pairs: u64,
    pairs_scored: u64,
    data_errors: Vec<DataError>,
    chunks_completed: usize,
    chunks_not_started: usize,
}

/// Folds outcomes into one result. Arrival order does not matter: outcomes
/// are sorted by chunk index first, so recorded data errors keep chunk order.
fn merge_outcomes(mut outcomes: Vec<ChunkOutcome>, max_recorded_errors: usize) -> Merged {
    outcomes.sort_by_key(ChunkOutcome::index);
    let mut merged = Merged::default();
    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Completed { output, .. } => {
                merged.chunks_completed += 1;
                merged.skipped_pairs += output.skipped_pairs;
                merged.pairs_scored += output.pairs_scored;
                let room = max_recorded_errors.saturating_sub(merged.data_errors.len());
                merged.data_errors.extend(output.data_errors.into_iter().take(room));
                merged.matches.extend(output.matches);
            }
            ChunkOutcome::NotStarted { .. } => merged.chunks_not_started += 1,
            ChunkOutcome::Failed { .. } => {}
        }
    }
    merged
}

#[derive(Default)]
struct Collected {
    outcomes: Vec<ChunkOutcome>,
    dispatched: usize,
    stop: Option<StopReason>,
}

/// Fixed-size parallel matcher.
///
/// # Example
///
/// ```
/// use lexalign::{AlignConfig, Entity, Scheduler};
///
/// let mouse = vec![Entity::new("http://mouse#MA_1", ["heart"])];
/// let human = vec![Entity::new("http://human#NCI_1", ["Heart"])];
///
/// let scheduler = Scheduler::new(AlignConfig::default().with_parallelism(2));
/// let report = scheduler.align(&mouse, &human)?;
/// assert_eq!(report.matches.len(), 1);
/// # Ok::<(), lexalign::AlignError>(())
/// ```
pub struct Scheduler<S: LabelScorer = CompositeScorer> {
    config: AlignConfig,
    scorer: S,
    cancel: CancelToken,
}

impl Scheduler<CompositeScorer> {
    /// Scheduler with the default composite scorer.
    #[must_use]
    pub fn new(config: AlignConfig) -> Self {
        Self::with_scorer(config, CompositeScorer)
    }
}

impl<S: LabelScorer> Scheduler<S> {
    /// Scheduler with a custom scorer.
    #[must_use]
    pub fn with_scorer(config: AlignConfig, scorer: S) -> Self {
        Self {
            config,
            scorer,
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels runs of this scheduler.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The configuration runs are validated against.
    #[must_use]
    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Generates the cross product of two entity lists and runs it.
    ///
    /// # Errors
    /// See [`Scheduler::run`].
    pub fn align(&self, source: &[Entity], target: &[Entity]) -> AlignResult<RunReport> {
        self.run(generate(source, target))
    }

    /// Scores all candidates and merges the matches.
    ///
    /// # Errors
    /// - `ValidationError` for an invalid configuration.
    /// - `ExecutionError::WorkerFailure` naming the lowest failing chunk if any
    ///   worker panicked.
    /// - `ExecutionError::Timeout` if the configured timeout elapsed.
    pub fn run(&self, candidates: Vec<CandidatePair<'_>>) -> AlignResult<RunReport> {
        self.config.validate()?;

        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut phase = PhaseTracker::new(run_id);

        let pairs_total = candidates.len();
        let chunks = partition(candidates, self.config.chunk_count());
        let chunks_total = chunks.len();
        let workers = self.config.parallelism.min(chunks_total).max(1);
        let deadline = self.config.timeout().map(|t| clock + t);

        info!(
            %run_id,
            pairs = pairs_total,
            chunks = chunks_total,
            workers,
            threshold = self.config.threshold,
            "starting run"
        );
        phase.advance(RunPhase::Dispatching);

        let abort = AtomicBool::new(false);
        let options = WorkerOptions {
            threshold: self.config.threshold,
            max_recorded_errors: self.config.max_recorded_errors,
            abort: Some(&abort),
        };
        let scorer = &self.scorer;
        let cancel = &self.cancel;

        let collected = thread::scope(|scope| -> AlignResult<Collected> {
            let (job_tx, job_rx) = bounded::<ChunkJob<'_>>(0);
            let (result_tx, result_rx) = bounded::<ChunkOutcome>(chunks_total);

            for idx in 0..workers {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                thread::Builder::new()
                    .name(format!("lexalign-worker-{idx}"))
                    .spawn_scoped(scope, move || {
                        worker_loop(&jobs, &results, scorer, options, cancel);
                    })
                    .map_err(|e| AlignError::internal(format!("failed to spawn worker {idx}: {e}")))?;
            }
            drop(job_rx);
            drop(result_tx);

            let mut collected = Collected::default();

            'dispatch: for (index, pairs) in chunks.into_iter().enumerate() {
                let mut job = ChunkJob { index, pairs };
                loop {
                    while let Ok(outcome) = result_rx.try_recv() {
                        collected.outcomes.push(outcome);
                    }
                    if let Some(reason) = self.stop_reason(deadline, &collected.outcomes) {
                        collected.stop = Some(reason);
                        break 'dispatch;
                    }
                    match job_tx.send_timeout(job, DISPATCH_POLL_INTERVAL) {
                        Ok(()) => {
                            collected.dispatched += 1;
                            debug!(%run_id, chunk = index, "dispatched chunk");
                            break;
                        }
                        Err(SendTimeoutError::Timeout(returned)) => job = returned,
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err(ExecutionError::Disconnected {
                                path: "worker_jobs".to_string(),
                            }
                            .into());
                        }
                    }
                }
            }

            // Closing the job channel lets idle workers exit.
            drop(job_tx);
            if collected.outcomes.iter().any(ChunkOutcome::is_failure) {
                collected.stop = Some(StopReason::merge(collected.stop, StopReason::Failed));
            }
            if matches!(collected.stop, Some(StopReason::Failed | StopReason::TimedOut)) {
                abort.store(true, Ordering::SeqCst);
            }
            phase.advance(RunPhase::Awaiting);

            while collected.outcomes.len() < collected.dispatched {
                let waiting_on_deadline = deadline.filter(|_| !abort.load(Ordering::SeqCst));
                let received = match waiting_on_deadline {
                    Some(d) => match result_rx.recv_deadline(d) {
                        Ok(outcome) => Some(outcome),
                        Err(RecvTimeoutError::Timeout) => {
                            warn!(%run_id, "deadline reached, aborting in-flight chunks");
                            abort.store(true, Ordering::SeqCst);
                            collected.stop =
                                Some(StopReason::merge(collected.stop, StopReason::TimedOut));
                            None
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(ExecutionError::Disconnected {
                                path: "worker_results".to_string(),
                            }
                            .into());
                        }
                    },
                    None => Some(result_rx.recv().map_err(|_| ExecutionError::Disconnected {
                        path: "worker_results".to_string(),
                    })?),
                };

                if let Some(outcome) = received {
                    if outcome.is_failure() {
                        abort.store(true, Ordering::SeqCst);
                        collected.stop =
                            Some(StopReason::merge(collected.stop, StopReason::Failed));
                    }
                    collected.outcomes.push(outcome);
                }
            }

            Ok(collected)
        });

        let Collected {
            outcomes,
            dispatched,
            stop,
        } = match collected {
            Ok(collected) => collected,
            Err(err) => {
                phase.advance(RunPhase::Failed);
                return Err(err);
            }
        };

        let first_failure = outcomes
            .iter()
            .filter_map(|o| match o {
                ChunkOutcome::Failed { index, message } => Some((*index, message)),
                _ => None,
            })
            .min_by_key(|(index, _)| *index);
        if let Some((index, message)) = first_failure {
            phase.advance(RunPhase::Failed);
            warn!(%run_id, chunk = index, error = %message, "worker failed, run aborted");
            return Err(ExecutionError::WorkerFailure {
                chunk: index,
                stage: SCORING_STAGE.to_string(),
                message: message.clone(),
            }
            .into());
        }

        if stop == Some(StopReason::TimedOut) {
            phase.advance(RunPhase::Failed);
            let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
            warn!(%run_id, duration_ms, dispatched, "run timed out");
            return Err(ExecutionError::Timeout { duration_ms }.into());
        }

        let Merged {
            matches,
            skipped_pairs,
            pairs_scored,
            data_errors,
            chunks_completed,
            chunks_not_started,
        } = merge_outcomes(outcomes, self.config.max_recorded_errors);
        phase.advance(RunPhase::Merged);

        if chunks_not_started > 0 {
            debug!(%run_id, chunks_not_started, "chunks returned unscored after cancellation");
        }
        let status = if stop == Some(StopReason::Cancelled) || chunks_not_started > 0 {
            phase.advance(RunPhase::Cancelled);
            RunStatus::Cancelled
        } else {
            phase.advance(RunPhase::Done);
            RunStatus::Done
        };

        let elapsed = clock.elapsed();
        info!(
            %run_id,
            %status,
            matches = matches.len(),
            skipped_pairs,
            chunks_completed,
            chunks_total,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        if skipped_pairs > 0 {
            warn!(%run_id, skipped_pairs, "pairs skipped because of malformed labels");
        }

        Ok(RunReport {
            run_id,
            status,
            matches,
            skipped_pairs,
            data_errors,
            pairs_total,
            pairs_scored,
            chunks_total,
            chunks_completed,
            workers,
            started_at,
            elapsed,
        })
    }

    fn stop_reason(&self, deadline: Option<Instant>, outcomes: &[ChunkOutcome]) -> Option<StopReason> {
        if outcomes.iter().any(ChunkOutcome::is_failure) {
            return Some(StopReason::Failed);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(StopReason::TimedOut);
        }
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        None
    }
}

/// Scores jobs until the job channel closes. A job received after the
/// cancel token was raised is returned as `NotStarted`: the dispatcher's own
/// cancel check can race with a worker picking up the hand-off.
fn worker_loop<S: LabelScorer + ?Sized>(
    jobs: &Receiver<ChunkJob<'_>>,
    results: &Sender<ChunkOutcome>,
    scorer: &S,
    options: WorkerOptions<'_>,
    cancel: &CancelToken,
) {
    while let Ok(job) = jobs.recv() {
        let index = job.index;
        if cancel.is_cancelled() {
            if results.send(ChunkOutcome::NotStarted { index }).is_err() {
                break;
            }
            continue;
        }
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
            process_chunk_with(&job.pairs, scorer, options)
        })) {
            Ok(output) => ChunkOutcome::Completed { index, output },
            Err(payload) => ChunkOutcome::Failed {
                index,
                message: panic_message(payload.as_ref()),
            },
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
