//! Summarizer Client interface.
//!
//! Defines the only external collaborator the pipeline needs and a
//! deterministic mock for testing and offline runs. Real implementations
//! (HTTP adapters) live outside this crate.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the summarizer is being asked to do.
///
/// Adapters use this to pick their framing; merge calls must preserve the
/// order of the parts they are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// The whole input fits one call.
    Whole,
    /// One chunk of a longer document.
    Chunk,
    /// Partial summaries, in document order, to merge into one.
    Merge,
}

impl std::fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whole => write!(f, "whole"),
            Self::Chunk => write!(f, "chunk"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Input to one summarizer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub text: String,
    pub style_hint: String,
    pub kind: SummaryKind,
}

impl SummaryRequest {
    pub fn new(text: impl Into<String>, style_hint: impl Into<String>, kind: SummaryKind) -> Self {
        Self {
            text: text.into(),
            style_hint: style_hint.into(),
            kind,
        }
    }
}

/// Failure at the provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizerError {
    /// Network, auth or quota failure. Retried with backoff.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider refused this input. Never retried.
    #[error("content error: {0}")]
    Content(String),
}

impl SummarizerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

/// Trait for summarizers.
///
/// One call in, one summary out. Implementations must be safe to call
/// concurrently; the pipeline fans calls out across tasks.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarizer name for logging (model or adapter name).
    fn name(&self) -> &str;

    /// Summarize `request.text` according to its kind and style hint.
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError>;
}

/// Deterministic mock summarizer for testing and offline runs.
///
/// Chunk and whole calls return the first sentence of the input; merge calls
/// return the parts joined in order with whitespace collapsed, so markers in
/// the input survive every level in document order.
pub struct MockSummarizer {
    /// Simulated model name.
    pub model_name: String,
    transient_failures: AtomicU32,
    always_fail: bool,
    reject_needle: Option<String>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSummarizer {
    /// Create a working mock summarizer.
    pub fn new() -> Self {
        Self {
            model_name: "mock-summarizer".to_string(),
            transient_failures: AtomicU32::new(0),
            always_fail: false,
            reject_needle: None,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` calls with a provider error, then succeed.
    pub fn fail_transient(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every call with a provider error.
    pub fn always_fail(mut self) -> Self {
        self.model_name = "mock-summarizer-fail".to_string();
        self.always_fail = true;
        self
    }

    /// Refuse any input containing `needle` with a content error.
    pub fn reject_containing(mut self, needle: impl Into<String>) -> Self {
        self.reject_needle = Some(needle.into());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        if self.always_fail {
            return Err(SummarizerError::Provider("simulated failure".to_string()));
        }

        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(SummarizerError::Provider(
                "simulated transient failure".to_string(),
            ));
        }

        if let Some(needle) = &self.reject_needle {
            if request.text.contains(needle.as_str()) {
                return Err(SummarizerError::Content(format!(
                    "input contains refused term '{needle}'"
                )));
            }
        }

        Ok(match request.kind {
            SummaryKind::Whole | SummaryKind::Chunk => first_sentence(&request.text),
            SummaryKind::Merge => collapse_whitespace(&request.text),
        })
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.respond(request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Text up to and including the first sentence terminator, trimmed.
fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                return trimmed[..idx + c.len_utf8()].to_string();
            }
        }
    }
    trimmed.to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
