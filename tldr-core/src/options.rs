//! Per-run pipeline options.
//!
//! Options are passed explicitly into every [`crate::Pipeline::tldr`] call;
//! nothing is held as ambient state, so runs stay independent and testable.
//! Every field has a default, so a config file may set any subset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::retry::RetryPolicy;

/// Default chunk budget in length units.
pub const DEFAULT_MAX_CHUNK_UNITS: usize = 2000;
/// Default number of sibling summaries merged per provider call.
pub const DEFAULT_BRANCHING_FACTOR: usize = 5;
/// Default number of merge levels before falling back to concatenation.
pub const DEFAULT_MAX_REDUCE_DEPTH: usize = 4;
/// Default total tries per provider call.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default number of provider calls in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Largest chunk, in estimator units, sent in one leaf call.
    pub max_chunk_units: usize,
    /// Maximum siblings per merge call. Must be >= 2.
    pub branching_factor: usize,
    /// Merge levels allowed before the remaining summaries are concatenated.
    pub max_reduce_depth: usize,
    /// Total tries per provider call (first try included).
    pub retry_attempts: u32,
    /// Free-form hint forwarded to the summarizer ("concise", "bullets", ...).
    pub style_hint: String,
    /// Provider calls allowed in flight at once.
    pub concurrency: usize,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Upper bound on a single backoff delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Whole-run deadline. `None` disables it.
    pub timeout_secs: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_chunk_units: DEFAULT_MAX_CHUNK_UNITS,
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            max_reduce_depth: DEFAULT_MAX_REDUCE_DEPTH,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            style_hint: "concise".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            timeout_secs: None,
        }
    }
}

impl PipelineOptions {
    /// Reject unusable settings before any provider call is made.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_chunk_units == 0 {
            return Err(PipelineError::InvalidOptions(
                "max_chunk_units must be > 0".to_string(),
            ));
        }
        if self.branching_factor < 2 {
            return Err(PipelineError::InvalidOptions(format!(
                "branching_factor must be >= 2, got {}",
                self.branching_factor
            )));
        }
        if self.max_reduce_depth == 0 {
            return Err(PipelineError::InvalidOptions(
                "max_reduce_depth must be > 0".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(PipelineError::InvalidOptions(
                "retry_attempts must be > 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidOptions(
                "concurrency must be > 0".to_string(),
            ));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(PipelineError::InvalidOptions(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(PipelineError::InvalidOptions(
                "timeout_secs must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy derived from the attempt and backoff fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            backoff_multiplier: self.backoff_multiplier,
            max_backoff_ms: self.max_backoff_ms,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
