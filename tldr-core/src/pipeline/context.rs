//! Per-run call context shared by the leaf and merge stages.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::fanout::RunGuard;
use crate::errors::{CallSite, PipelineError};
use crate::estimator::LengthEstimator;
use crate::events::{PipelineEvent, SharedEventBus};
use crate::retry::{summarize_with_retry, RetryPolicy};
use crate::summarizer::{SummaryKind, SummaryRequest, Summarizer};

/// Everything a provider call needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub summarizer: Arc<dyn Summarizer>,
    pub estimator: Arc<dyn LengthEstimator>,
    pub events: Option<SharedEventBus>,
    pub guard: RunGuard,
    pub policy: RetryPolicy,
    pub style_hint: Arc<str>,
    pub concurrency: usize,
}

/// A finished provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub summary: String,
    pub attempts: u32,
    /// Estimated units of the text sent.
    pub input_units: usize,
    pub latency_ms: u64,
}

impl CallOutcome {
    pub fn retries(&self) -> usize {
        self.attempts.saturating_sub(1) as usize
    }
}

impl RunContext {
    pub fn publish(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Summarize one chunk (or the whole input).
    pub async fn leaf(
        &self,
        site: CallSite,
        text: String,
        kind: SummaryKind,
    ) -> Result<CallOutcome, PipelineError> {
        let outcome = self.call(&site, text, kind).await?;
        self.publish(PipelineEvent::ChunkSummarized {
            run_id: self.run_id,
            site,
            input_units: outcome.input_units,
            attempts: outcome.attempts,
            latency_ms: outcome.latency_ms,
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    /// Merge `children` ordered summaries already joined into `text`.
    pub async fn merge(
        &self,
        site: CallSite,
        text: String,
        children: usize,
    ) -> Result<CallOutcome, PipelineError> {
        let outcome = self.call(&site, text, SummaryKind::Merge).await?;
        self.publish(PipelineEvent::MergeCompleted {
            run_id: self.run_id,
            site,
            children,
            input_units: outcome.input_units,
            attempts: outcome.attempts,
            latency_ms: outcome.latency_ms,
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    async fn call(
        &self,
        site: &CallSite,
        text: String,
        kind: SummaryKind,
    ) -> Result<CallOutcome, PipelineError> {
        let input_units = self.estimator.estimate(&text);
        let request = SummaryRequest::new(text, self.style_hint.as_ref(), kind);
        let started = Instant::now();

        let attempted = summarize_with_retry(
            self.summarizer.as_ref(),
            &request,
            &self.policy,
            site,
            self.events.as_deref(),
            self.run_id,
        )
        .await?;

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(
            site = %site,
            %kind,
            input_units,
            attempts = attempted.attempts,
            latency_ms,
            "provider call completed"
        );
        Ok(CallOutcome {
            summary: attempted.summary,
            attempts: attempted.attempts,
            input_units,
            latency_ms,
        })
    }
}
