//! Diagnostic event types emitted by a pipeline run.
//!
//! Events are observability only: the pipeline never reads them back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CallSite, CancelReason, Stage};

/// All pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run passed validation and estimated its input
    RunStarted {
        run_id: Uuid,
        input_bytes: usize,
        input_units: usize,
        needs_split: bool,
        timestamp: DateTime<Utc>,
    },

    /// The splitter produced its chunks
    InputSplit {
        run_id: Uuid,
        chunk_count: usize,
        max_chunk_units: usize,
        hard_cuts: usize,
        timestamp: DateTime<Utc>,
    },

    /// One leaf call (whole input or chunk) returned
    ChunkSummarized {
        run_id: Uuid,
        site: CallSite,
        input_units: usize,
        attempts: u32,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A provider call failed transiently and will be retried
    RetryScheduled {
        run_id: Uuid,
        site: CallSite,
        attempt: u32,
        backoff_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A reduction level is about to fan out its merge calls
    LevelStarted {
        run_id: Uuid,
        level: usize,
        inputs: usize,
        merges: usize,
        timestamp: DateTime<Utc>,
    },

    /// One merge call returned
    MergeCompleted {
        run_id: Uuid,
        site: CallSite,
        children: usize,
        input_units: usize,
        attempts: u32,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The depth limit forced verbatim concatenation
    ReductionTruncated {
        run_id: Uuid,
        levels: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run produced its result
    RunCompleted {
        run_id: Uuid,
        chunk_count: usize,
        tree_depth: usize,
        provider_calls: usize,
        truncated_reduction: bool,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run stopped on an unrecoverable error
    RunFailed {
        run_id: Uuid,
        stage: Stage,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The run was cancelled or hit its deadline
    RunCancelled {
        run_id: Uuid,
        stage: Stage,
        reason: CancelReason,
        completed_chunks: usize,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn retry_scheduled(
        run_id: Uuid,
        site: CallSite,
        attempt: u32,
        backoff: Duration,
        error: &str,
    ) -> Self {
        PipelineEvent::RetryScheduled {
            run_id,
            site,
            attempt,
            backoff_ms: backoff.as_millis() as u64,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "run_started",
            PipelineEvent::InputSplit { .. } => "input_split",
            PipelineEvent::ChunkSummarized { .. } => "chunk_summarized",
            PipelineEvent::RetryScheduled { .. } => "retry_scheduled",
            PipelineEvent::LevelStarted { .. } => "level_started",
            PipelineEvent::MergeCompleted { .. } => "merge_completed",
            PipelineEvent::ReductionTruncated { .. } => "reduction_truncated",
            PipelineEvent::RunCompleted { .. } => "run_completed",
            PipelineEvent::RunFailed { .. } => "run_failed",
            PipelineEvent::RunCancelled { .. } => "run_cancelled",
        }
    }

    /// Get the run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::InputSplit { run_id, .. }
            | PipelineEvent::ChunkSummarized { run_id, .. }
            | PipelineEvent::RetryScheduled { run_id, .. }
            | PipelineEvent::LevelStarted { run_id, .. }
            | PipelineEvent::MergeCompleted { run_id, .. }
            | PipelineEvent::ReductionTruncated { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::RunFailed { run_id, .. }
            | PipelineEvent::RunCancelled { run_id, .. } => *run_id,
        }
    }

    /// Get the event timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PipelineEvent::RunStarted { timestamp, .. }
            | PipelineEvent::InputSplit { timestamp, .. }
            | PipelineEvent::ChunkSummarized { timestamp, .. }
            | PipelineEvent::RetryScheduled { timestamp, .. }
            | PipelineEvent::LevelStarted { timestamp, .. }
            | PipelineEvent::MergeCompleted { timestamp, .. }
            | PipelineEvent::ReductionTruncated { timestamp, .. }
            | PipelineEvent::RunCompleted { timestamp, .. }
            | PipelineEvent::RunFailed { timestamp, .. }
            | PipelineEvent::RunCancelled { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::RunCompleted { .. }
                | PipelineEvent::RunFailed { .. }
                | PipelineEvent::RunCancelled { .. }
        )
    }
}
