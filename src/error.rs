//! Error types for lexalign.
//!
//! All errors are strongly typed using thiserror, one enum per concern,
//! aggregated by [`AlignError`]. Data errors are the only recoverable kind:
//! the worker skips the offending pair and counts it instead of failing.

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors for configuration and caller-supplied inputs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Threshold {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        value: f64,
    },

    #[error("Parallelism must be at least 1, got {value}")]
    InvalidParallelism {
        value: usize,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

/// Malformed entity data encountered while scoring.
///
/// Never fatal: the pair is excluded and the skip counter increments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("Label of <{iri}> is not a string: {found}")]
    NonStringLabel {
        iri: String,
        found: String,
    },

    #[error("Label of <{iri}> contains control character U+{code:04X} at position {position}")]
    ControlCharacter {
        iri: String,
        code: u32,
        position: usize,
    },

    #[error("Label of <{iri}> has {length} characters, exceeding the maximum of {max_length}")]
    LabelTooLong {
        iri: String,
        length: usize,
        max_length: usize,
    },
}

impl DataError {
    /// IRI of the entity carrying the malformed label.
    #[must_use]
    pub fn iri(&self) -> &str {
        match self {
            Self::NonStringLabel { iri, .. }
            | Self::ControlCharacter { iri, .. }
            | Self::LabelTooLong { iri, .. } => iri,
        }
    }
}

/// Execution errors raised by the scheduler.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Worker failed on chunk {chunk} during {stage}: {message}")]
    WorkerFailure {
        chunk: usize,
        stage: String,
        message: String,
    },

    #[error("Run timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Sequential and parallel runs disagree: fingerprint {sequential} vs {parallel}")]
    Divergence {
        sequential: String,
        parallel: String,
    },

    #[error("Channel disconnected on {path}")]
    Disconnected {
        path: String,
    },
}

/// Errors from the graph loader.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse {
        path: PathBuf,
        message: String,
    },

    #[error("Unsupported graph format for {path} (expected .ttl, .nt, .owl, .rdf or .json)")]
    UnsupportedFormat {
        path: PathBuf,
    },

    #[error("Invalid base IRI '{iri}': {message}")]
    InvalidIri {
        iri: String,
        message: String,
    },
}

/// Errors from writing or reading a persisted alignment.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RDF syntax error: {message}")]
    Rdf {
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Alignment format '{name}' is not supported")]
    UnsupportedFormat {
        name: String,
    },
}

/// Top-level error type for lexalign.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AlignError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a load error.
    #[must_use]
    pub const fn is_load(&self) -> bool {
        matches!(self, Self::Load(_))
    }

    /// Returns true if this is a serialization error.
    #[must_use]
    pub const fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Index of the failing chunk, when a worker failure aborted the run.
    #[must_use]
    pub const fn failed_chunk(&self) -> Option<usize> {
        match self {
            Self::Execution(ExecutionError::WorkerFailure { chunk, .. }) => Some(*chunk),
            _ => None,
        }
    }
}

/// Result type alias for lexalign operations.
pub type AlignResult<T> = Result<T, AlignError>;
