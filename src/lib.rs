//! # lexalign - Parallel Lexical Ontology Alignment
//!
//! lexalign compares every class of one ontology with every class of another
//! by their labels, keeps the pairs whose best label similarity clears a
//! threshold, and scores the result against a reference alignment.
//!
//! ## Core Concepts
//!
//! - **Entity**: a class IRI plus its ordered, de-duplicated labels
//! - **Scorer**: `max(Jaro-Winkler, I-Sub)` over one label pair
//! - **Chunk**: a round-robin slice of the candidate pairs, scored by one worker
//! - **MatchSet**: the merged, order-free set of qualifying entity pairs
//!
//! ## Usage
//!
//! ```rust
//! use lexalign::{evaluate, AlignConfig, Entity, Match, MatchSet, Scheduler};
//!
//! let mouse = vec![
//!     Entity::new("http://mouse.owl#MA_0000072", ["heart"]),
//!     Entity::new("http://mouse.owl#MA_0000415", ["lung"]),
//! ];
//! let human = vec![
//!     Entity::new("http://human.owl#NCI_C12727", ["Heart"]),
//!     Entity::new("http://human.owl#NCI_C12468", ["Lung"]),
//! ];
//!
//! let config = AlignConfig::default().with_threshold(0.8).with_parallelism(4);
//! let report = Scheduler::new(config).align(&mouse, &human)?;
//!
//! let reference: MatchSet = [
//!     Match::new("http://mouse.owl#MA_0000072", "http://human.owl#NCI_C12727", 1.0),
//!     Match::new("http://mouse.owl#MA_0000415", "http://human.owl#NCI_C12468", 1.0),
//! ]
//! .into_iter()
//! .collect();
//! assert_eq!(evaluate(&report.matches, &reference).f_score, 1.0);
//! # Ok::<(), lexalign::AlignError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core matching engine
pub mod alignment;
pub mod candidates;
pub mod entity;
pub mod error;
pub mod partition;
pub mod scheduler;
pub mod similarity;
pub mod worker;

// Evaluation
pub mod evaluation;

// Collaborators: configuration, loading, persistence, orchestration
pub mod config;
pub mod loader;
pub mod pipeline;
pub mod serializer;

// Re-export primary types at crate root for convenience
pub use alignment::{Match, MatchSet};
pub use candidates::generate;
pub use config::AlignConfig;
pub use entity::{CandidatePair, Entity, Graph};
pub use error::{
    AlignError, AlignResult, DataError, ExecutionError, LoadError, SerializationError,
    ValidationError,
};
pub use evaluation::{evaluate, EvaluationResult};
pub use loader::{load_pair, FileLoader, GraphFormat, GraphLoader};
pub use partition::partition;
pub use pipeline::{
    AlignmentBatch, AlignmentOutcome, AlignmentTask, BatchEntry, ParallelComparison, StageTimings,
};
pub use scheduler::{CancelToken, RunId, RunPhase, RunReport, RunStatus, Scheduler};
pub use serializer::{AlignmentFormat, AlignmentSerializer, JsonAlignment, TurtleAlignment};
pub use similarity::{label_similarity, CompositeScorer, LabelScorer};
pub use worker::{process_chunk, WorkerOutput};
