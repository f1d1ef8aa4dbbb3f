//! Pipeline orchestrator: drives one run through its phases.
//!
//! ```text
//! Start ──[fits budget]──▶ SummarizeWhole ─────────────────────────▶ Done
//!   └────[over budget]──▶ Split ──▶ SummarizeChunks ──▶ Reduce ──▶ Done
//! any phase ──▶ Failed (first unrecoverable error, no partial result)
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::{CallOutcome, RunContext};
use super::fanout::{fan_out, FanOutError, RunGuard};
use super::result::PipelineResult;
use crate::errors::{CallSite, PartialSummaries, PipelineError, Stage};
use crate::estimator::{CharCountEstimator, LengthEstimator};
use crate::events::{PipelineEvent, SharedEventBus};
use crate::options::PipelineOptions;
use crate::reducer::Reducer;
use crate::splitter::{self, BreakKind, Chunk};
use crate::summarizer::{SummaryKind, Summarizer};
use crate::tree::SummaryNode;

// ── PipelinePhase ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum PipelinePhase {
    Start,
    SummarizeWhole,
    Split,
    SummarizeChunks { chunks: Vec<Chunk> },
    Reduce {
        chunk_count: usize,
        leaves: Vec<SummaryNode>,
    },
    Done(PipelineResult),
}

impl PipelinePhase {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::SummarizeWhole => "summarize_whole",
            Self::Split => "split",
            Self::SummarizeChunks { .. } => "summarize_chunks",
            Self::Reduce { .. } => "reduce",
            Self::Done(_) => "done",
        }
    }
}

/// Counters accumulated across phases.
#[derive(Debug, Default)]
struct RunTally {
    provider_calls: usize,
    retries: usize,
    estimated_tokens: usize,
}

impl RunTally {
    fn record(&mut self, outcome: &CallOutcome) {
        self.provider_calls += 1;
        self.retries += outcome.retries();
        self.estimated_tokens += outcome.input_units;
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Summarization pipeline bound to one summarizer.
///
/// Holds no per-run state: a single `Pipeline` can serve concurrent runs.
#[derive(Clone)]
pub struct Pipeline {
    summarizer: Arc<dyn Summarizer>,
    estimator: Arc<dyn LengthEstimator>,
    events: Option<SharedEventBus>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            summarizer,
            estimator: Arc::new(CharCountEstimator::default()),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn LengthEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Publish diagnostic events for every run on `bus`.
    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Cancelling `token` interrupts every run in progress.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn estimator(&self) -> &dyn LengthEstimator {
        self.estimator.as_ref()
    }

    /// Summarize `text`.
    pub async fn tldr(
        &self,
        text: &str,
        options: &PipelineOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        match self.run(run_id, text, options).await {
            Ok(result) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    %run_id,
                    chunk_count = result.chunk_count,
                    tree_depth = result.tree_depth,
                    provider_calls = result.provider_calls,
                    retries = result.retries,
                    truncated = result.truncated_reduction,
                    elapsed_ms,
                    "tldr run completed"
                );
                self.publish(PipelineEvent::RunCompleted {
                    run_id,
                    chunk_count: result.chunk_count,
                    tree_depth: result.tree_depth,
                    provider_calls: result.provider_calls,
                    truncated_reduction: result.truncated_reduction,
                    elapsed_ms,
                    timestamp: Utc::now(),
                });
                Ok(result)
            }
            Err(err) => {
                match &err {
                    PipelineError::Cancelled {
                        reason,
                        stage,
                        partial,
                    } => {
                        warn!(%run_id, %stage, %reason, completed = partial.completed(), "tldr run interrupted");
                        self.publish(PipelineEvent::RunCancelled {
                            run_id,
                            stage: *stage,
                            reason: *reason,
                            completed_chunks: partial.completed(),
                            timestamp: Utc::now(),
                        });
                    }
                    other => {
                        error!(%run_id, stage = %other.stage(), error = %other, "tldr run failed");
                        self.publish(PipelineEvent::RunFailed {
                            run_id,
                            stage: other.stage(),
                            error: other.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        run_id: Uuid,
        text: &str,
        options: &PipelineOptions,
    ) -> Result<PipelineResult, PipelineError> {
        options.validate()?;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let ctx = self.context(run_id, options);
        let mut tally = RunTally::default();
        let mut phase = PipelinePhase::Start;

        loop {
            debug!(%run_id, phase = phase.name(), "entering phase");
            phase = match phase {
                PipelinePhase::Start => {
                    let units = self.estimator.estimate(text);
                    let needs_split = units > options.max_chunk_units;
                    info!(
                        %run_id,
                        bytes = text.len(),
                        units,
                        max_chunk_units = options.max_chunk_units,
                        needs_split,
                        "tldr run started"
                    );
                    self.publish(PipelineEvent::RunStarted {
                        run_id,
                        input_bytes: text.len(),
                        input_units: units,
                        needs_split,
                        timestamp: Utc::now(),
                    });
                    if needs_split {
                        PipelinePhase::Split
                    } else {
                        PipelinePhase::SummarizeWhole
                    }
                }

                PipelinePhase::SummarizeWhole => {
                    let outcome = summarize_whole(&ctx, text).await?;
                    tally.record(&outcome);
                    let tree = SummaryNode::leaf(0, 0, text.len(), outcome.summary.clone());
                    PipelinePhase::Done(PipelineResult {
                        run_id,
                        summary: outcome.summary,
                        chunk_count: 1,
                        tree_depth: 1,
                        provider_calls: tally.provider_calls,
                        retries: tally.retries,
                        estimated_tokens: tally.estimated_tokens,
                        truncated_reduction: false,
                        tree,
                    })
                }

                PipelinePhase::Split => {
                    if let Some(reason) = ctx.guard.interrupted() {
                        return Err(PipelineError::Cancelled {
                            reason,
                            stage: Stage::Split,
                            partial: PartialSummaries::default(),
                        });
                    }
                    let chunks = splitter::split(text, options.max_chunk_units, self.estimator.as_ref())?;
                    let hard_cuts = chunks
                        .iter()
                        .filter(|c| c.break_kind == BreakKind::Hard)
                        .count();
                    info!(%run_id, chunk_count = chunks.len(), hard_cuts, "input split");
                    self.publish(PipelineEvent::InputSplit {
                        run_id,
                        chunk_count: chunks.len(),
                        max_chunk_units: options.max_chunk_units,
                        hard_cuts,
                        timestamp: Utc::now(),
                    });
                    PipelinePhase::SummarizeChunks { chunks }
                }

                PipelinePhase::SummarizeChunks { chunks } => {
                    let outcomes = summarize_chunks(&ctx, &chunks).await?;
                    let leaves = chunks
                        .iter()
                        .zip(outcomes)
                        .map(|(chunk, outcome)| {
                            tally.record(&outcome);
                            SummaryNode::leaf(
                                chunk.position,
                                chunk.span.start,
                                chunk.span.end,
                                outcome.summary,
                            )
                        })
                        .collect();
                    PipelinePhase::Reduce {
                        chunk_count: chunks.len(),
                        leaves,
                    }
                }

                PipelinePhase::Reduce {
                    chunk_count,
                    leaves,
                } => {
                    let partial = PartialSummaries {
                        chunk_summaries: leaves
                            .iter()
                            .map(|leaf| Some(leaf.summary().to_string()))
                            .collect(),
                    };
                    let reduced = Reducer::from_options(options)
                        .reduce(leaves, &ctx)
                        .await
                        .map_err(|err| match err {
                            PipelineError::Cancelled { reason, stage, .. } => {
                                PipelineError::Cancelled {
                                    reason,
                                    stage,
                                    partial,
                                }
                            }
                            other => other,
                        })?;

                    PipelinePhase::Done(PipelineResult {
                        run_id,
                        summary: reduced.root.summary().to_string(),
                        chunk_count,
                        tree_depth: 1 + reduced.levels,
                        provider_calls: tally.provider_calls + reduced.provider_calls,
                        retries: tally.retries + reduced.retries,
                        estimated_tokens: tally.estimated_tokens + reduced.estimated_tokens,
                        truncated_reduction: reduced.truncated,
                        tree: reduced.root,
                    })
                }

                PipelinePhase::Done(result) => return Ok(result),
            };
        }
    }

    fn context(&self, run_id: Uuid, options: &PipelineOptions) -> RunContext {
        let deadline = options
            .timeout()
            .map(|timeout| tokio::time::Instant::now() + timeout);
        RunContext {
            run_id,
            summarizer: self.summarizer.clone(),
            estimator: self.estimator.clone(),
            events: self.events.clone(),
            guard: RunGuard::new(self.cancel.child_token(), deadline),
            policy: options.retry_policy(),
            style_hint: Arc::from(options.style_hint.as_str()),
            concurrency: options.concurrency,
        }
    }

    fn publish(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

// ── Phase helpers ────────────────────────────────────────────────────────────

async fn summarize_whole(ctx: &RunContext, text: &str) -> Result<CallOutcome, PipelineError> {
    let site = CallSite::whole(text.len());
    let text = text.to_string();
    let mut outcomes = fan_out(1, 1, &ctx.guard, Stage::SummarizeWhole, |_| {
        let ctx = ctx.clone();
        let site = site.clone();
        let text = text.clone();
        async move { ctx.leaf(site, text, SummaryKind::Whole).await }
    })
    .await
    .map_err(|err| match err {
        FanOutError::Failed(err) => err,
        FanOutError::Interrupted { reason, .. } => PipelineError::Cancelled {
            reason,
            stage: Stage::SummarizeWhole,
            partial: PartialSummaries {
                chunk_summaries: vec![None],
            },
        },
    })?;

    outcomes.pop().ok_or_else(|| PipelineError::Internal {
        stage: Stage::SummarizeWhole,
        message: "no outcome for whole-input call".to_string(),
    })
}

async fn summarize_chunks(
    ctx: &RunContext,
    chunks: &[Chunk],
) -> Result<Vec<CallOutcome>, PipelineError> {
    fan_out(
        chunks.len(),
        ctx.concurrency,
        &ctx.guard,
        Stage::SummarizeChunks,
        |idx| {
            let ctx = ctx.clone();
            let chunk = &chunks[idx];
            let site = CallSite::chunk(chunk.position, chunk.span.start, chunk.span.end);
            let text = chunk.span.text.clone();
            async move { ctx.leaf(site, text, SummaryKind::Chunk).await }
        },
    )
    .await
    .map_err(|err| match err {
        FanOutError::Failed(err) => err,
        FanOutError::Interrupted { reason, completed } => PipelineError::Cancelled {
            reason,
            stage: Stage::SummarizeChunks,
            partial: PartialSummaries {
                chunk_summaries: completed
                    .into_iter()
                    .map(|slot| slot.map(|outcome| outcome.summary))
                    .collect(),
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::MockSummarizer;

    fn options(max_chunk_units: usize) -> PipelineOptions {
        PipelineOptions {
            max_chunk_units,
            initial_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn short_input_is_one_call() {
        let mock = Arc::new(MockSummarizer::new());
        let pipeline = Pipeline::new(mock.clone());
        let result = pipeline
            .tldr("One short sentence. Another one.", &options(2000))
            .await
            .unwrap();
        assert_eq!(result.summary, "One short sentence.");
        assert_eq!(result.chunk_count, 1);
        assert_eq!(result.tree_depth, 1);
        assert_eq!(result.provider_calls, 1);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn whitespace_input_is_rejected_before_any_call() {
        let mock = Arc::new(MockSummarizer::new());
        let err = Pipeline::new(mock.clone())
            .tldr(" \n\t ", &options(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn run_events_end_with_completion() {
        let bus = crate::events::EventBus::new().shared();
        let mut rx = bus.subscribe();
        let pipeline = Pipeline::new(Arc::new(MockSummarizer::new())).with_events(bus);
        pipeline.tldr("Fits easily.", &options(100)).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(kinds.first(), Some(&"run_started"));
        assert_eq!(kinds.last(), Some(&"run_completed"));
        assert!(kinds.contains(&"chunk_summarized"));
    }

    #[test]
    fn phase_names() {
        assert_eq!(PipelinePhase::Start.name(), "start");
        assert_eq!(PipelinePhase::Split.name(), "split");
    }
}
