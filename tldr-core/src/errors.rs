//! Pipeline error taxonomy.
//!
//! Every failure the pipeline can surface is represented here. Callers can
//! query `stage()` / `is_retryable()` without string matching.
//!
//! | Error            | Retryable | Raised by                         |
//! |------------------|-----------|-----------------------------------|
//! | InvalidOptions   | no        | options validation, splitter      |
//! | EmptyInput       | no        | orchestrator, before any call     |
//! | Provider         | yes*      | retry wrapper, after the last try |
//! | Content          | no        | retry wrapper, immediately        |
//! | Cancelled        | yes       | fan-out, level barrier            |
//! | Internal         | no        | task join / slot bookkeeping      |
//!
//! *`Provider` has already been retried `attempts` times when it surfaces.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Options validation, before anything else runs.
    Validate,
    /// Splitting the input into chunks.
    Split,
    /// Single-call path for input that fits the budget.
    SummarizeWhole,
    /// Per-chunk leaf summarization.
    SummarizeChunks,
    /// Level-by-level merge of partial summaries.
    Reduce,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => write!(f, "validate"),
            Self::Split => write!(f, "split"),
            Self::SummarizeWhole => write!(f, "summarize_whole"),
            Self::SummarizeChunks => write!(f, "summarize_chunks"),
            Self::Reduce => write!(f, "reduce"),
        }
    }
}

/// Identifies one provider call: which stage, which slot, which bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub stage: Stage,
    /// Chunk position for leaf calls, batch index for merge calls.
    pub position: usize,
    /// Reduction level (1-based) for merge calls, 0 otherwise.
    pub level: usize,
    /// Byte offset of the first covered input byte.
    pub start: usize,
    /// Byte offset one past the last covered input byte.
    pub end: usize,
}

impl CallSite {
    pub fn whole(len: usize) -> Self {
        Self {
            stage: Stage::SummarizeWhole,
            position: 0,
            level: 0,
            start: 0,
            end: len,
        }
    }

    pub fn chunk(position: usize, start: usize, end: usize) -> Self {
        Self {
            stage: Stage::SummarizeChunks,
            position,
            level: 0,
            start,
            end,
        }
    }

    pub fn merge(level: usize, batch: usize, start: usize, end: usize) -> Self {
        Self {
            stage: Stage::Reduce,
            position: batch,
            level,
            start,
            end,
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Stage::Reduce => write!(
                f,
                "merge level {} batch #{} [{}..{})",
                self.level, self.position, self.start, self.end
            ),
            Stage::SummarizeWhole => write!(f, "whole input [{}..{})", self.start, self.end),
            _ => write!(
                f,
                "chunk #{} [{}..{})",
                self.position, self.start, self.end
            ),
        }
    }
}

/// Why a run stopped before producing a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The configured `timeout_secs` deadline passed.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Chunk summaries that were finished when a run was interrupted.
///
/// Diagnostic output only. Slots are indexed by chunk position; `None`
/// marks a chunk whose call never completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSummaries {
    pub chunk_summaries: Vec<Option<String>>,
}

impl PartialSummaries {
    pub fn completed(&self) -> usize {
        self.chunk_summaries.iter().filter(|s| s.is_some()).count()
    }
}

impl fmt::Display for PartialSummaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} chunk summaries completed",
            self.completed(),
            self.chunk_summaries.len()
        )
    }
}

/// Unified error type for every pipeline operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Budget, branching or retry settings are unusable.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Nothing to summarize.
    #[error("input is empty")]
    EmptyInput,

    /// Transport / auth / quota failure that outlived the retry budget.
    #[error("provider error at {site} after {attempts} attempt(s): {message}")]
    Provider {
        site: CallSite,
        attempts: u32,
        message: String,
    },

    /// The provider refused the input. Never retried.
    #[error("content rejected at {site}: {message}")]
    Content { site: CallSite, message: String },

    /// Run interrupted by the caller or by the deadline.
    #[error("{reason} during {stage} ({partial})")]
    Cancelled {
        reason: CancelReason,
        stage: Stage,
        partial: PartialSummaries,
    },

    /// A worker task panicked or bookkeeping went wrong.
    #[error("internal error during {stage}: {message}")]
    Internal { stage: Stage, message: String },
}

impl PipelineError {
    /// Stage the error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidOptions(_) | Self::EmptyInput => Stage::Validate,
            Self::Provider { site, .. } | Self::Content { site, .. } => site.stage,
            Self::Cancelled { stage, .. } | Self::Internal { stage, .. } => *stage,
        }
    }

    /// Whether re-running the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Cancelled { .. })
    }

    /// The failing call, when the error came from the provider boundary.
    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            Self::Provider { site, .. } | Self::Content { site, .. } => Some(site),
            _ => None,
        }
    }
}
