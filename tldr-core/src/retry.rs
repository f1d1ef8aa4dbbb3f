//! Bounded retry with exponential backoff around one summarizer call.
//!
//! Only [`SummarizerError::Provider`] is retried. A content refusal surfaces
//! on the first occurrence, tagged with the call site so the caller can see
//! which chunk (and which bytes) the provider refused.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{CallSite, PipelineError};
use crate::events::{EventBus, PipelineEvent};
use crate::summarizer::{SummaryRequest, Summarizer, SummarizerError};

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total tries, first one included. Must be >= 1.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-indexed). Zero for `retry == 0`.
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        if retry == 0 {
            return 0;
        }
        let delay = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another try is allowed after `attempt` tries have been made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn backoff_duration(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(retry))
    }
}

impl Default for RetryPolicy {
    /// Default: 3 tries, 500ms initial backoff, 2x multiplier, 5s max.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

/// A successful call and how many tries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted {
    pub summary: String,
    pub attempts: u32,
}

/// Call the summarizer, retrying provider failures with backoff.
///
/// A blank summary counts as a provider failure. On exhaustion the last
/// provider message is surfaced with the number of tries made.
pub async fn summarize_with_retry(
    summarizer: &dyn Summarizer,
    request: &SummaryRequest,
    policy: &RetryPolicy,
    site: &CallSite,
    events: Option<&EventBus>,
    run_id: Uuid,
) -> Result<Attempted, PipelineError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = match summarizer.summarize(request).await {
            Ok(summary) if summary.trim().is_empty() => Err(SummarizerError::Provider(
                "provider returned an empty summary".to_string(),
            )),
            other => other,
        };

        match outcome {
            Ok(summary) => {
                return Ok(Attempted {
                    summary,
                    attempts: attempt,
                })
            }
            Err(SummarizerError::Content(message)) => {
                warn!(site = %site, summarizer = summarizer.name(), error = %message, "content rejected");
                return Err(PipelineError::Content {
                    site: site.clone(),
                    message,
                });
            }
            Err(SummarizerError::Provider(message)) => {
                if !policy.should_retry(attempt) {
                    return Err(PipelineError::Provider {
                        site: site.clone(),
                        attempts: attempt,
                        message,
                    });
                }

                let backoff = policy.backoff_duration(attempt);
                warn!(
                    site = %site,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %message,
                    "transient provider error, retrying"
                );
                if let Some(bus) = events {
                    bus.publish(PipelineEvent::retry_scheduled(
                        run_id,
                        site.clone(),
                        attempt,
                        backoff,
                        &message,
                    ));
                }
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
