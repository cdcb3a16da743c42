//! Run configuration.
//!
//! Precedence, lowest to highest: built-in defaults, JSON config file,
//! `LEXALIGN_*` environment variables, explicit CLI flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AlignResult, LoadError, ValidationError};
use crate::worker::DEFAULT_MAX_RECORDED_ERRORS;

/// Default similarity threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Environment variable overriding the threshold.
pub const ENV_THRESHOLD: &str = "LEXALIGN_THRESHOLD";
/// Environment variable overriding the worker count.
pub const ENV_THREADS: &str = "LEXALIGN_THREADS";
/// Environment variable setting a global run timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "LEXALIGN_TIMEOUT_MS";

/// Matching configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Minimum best label-pair score for a match, inclusive.
    pub threshold: f64,
    /// Number of worker threads.
    pub parallelism: usize,
    /// Chunks per worker. Values above 1 give finer load balancing and let
    /// cancellation stop more of the remaining work.
    pub chunks_per_worker: usize,
    /// Optional wall-clock limit for the whole run.
    pub timeout_ms: Option<u64>,
    /// Cap on data errors kept in the report.
    pub max_recorded_errors: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            parallelism: default_parallelism(),
            chunks_per_worker: 1,
            timeout_ms: None,
            max_recorded_errors: DEFAULT_MAX_RECORDED_ERRORS,
        }
    }
}

/// Available hardware parallelism, at least 1.
#[must_use]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

impl AlignConfig {
    /// Defaults with `LEXALIGN_*` overrides from the process environment.
    ///
    /// # Errors
    /// `ValidationError::InvalidValue` if a variable does not parse.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Loads a JSON config file; missing fields take their defaults.
    ///
    /// # Errors
    /// `LoadError::Io` or `LoadError::Parse` naming the file.
    pub fn from_json_file(path: &Path) -> AlignResult<Self> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Applies overrides from a variable lookup.
    ///
    /// # Errors
    /// `ValidationError::InvalidValue` if a variable does not parse.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_THRESHOLD) {
            self.threshold = parse_var(ENV_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_THREADS) {
            let threads: usize = parse_var(ENV_THREADS, &raw)?;
            if threads > 0 {
                info!(threads, "using worker count from {ENV_THREADS}");
                self.parallelism = threads;
            }
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = Some(parse_var(ENV_TIMEOUT_MS, &raw)?);
        }
        Ok(self)
    }

    /// Checks threshold and parallelism.
    ///
    /// # Errors
    /// `ThresholdOutOfRange` unless `0.0 <= threshold <= 1.0`;
    /// `InvalidParallelism` for 0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(ValidationError::ThresholdOutOfRange {
                value: self.threshold,
            });
        }
        if self.parallelism == 0 {
            return Err(ValidationError::InvalidParallelism {
                value: self.parallelism,
            });
        }
        if self.chunks_per_worker == 0 {
            return Err(ValidationError::InvalidValue {
                field: "chunks_per_worker".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Number of chunks the candidate list is split into.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.parallelism.saturating_mul(self.chunks_per_worker)
    }

    /// The run timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Sets the minimum match score.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the worker thread count.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets how many chunks each worker is given on average.
    #[must_use]
    pub fn with_chunks_per_worker(mut self, chunks_per_worker: usize) -> Self {
        self.chunks_per_worker = chunks_per_worker;
        self
    }

    /// Sets the wall-clock limit for a run, at millisecond precision.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ValidationError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ValidationError::InvalidValue {
            field: key.to_string(),
            reason: format!("'{raw}': {e}"),
        })
}
