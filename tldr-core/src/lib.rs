//! tl;dr summarization pipeline
//!
//! This library provides:
//! - Budget-aware splitting of long text into ordered, lossless chunks
//! - Concurrent per-chunk summarization through a pluggable [`Summarizer`]
//! - Level-by-level reduction of partial summaries into one
//!
//! # Flow
//!
//! ```text
//! text ──▶ estimate ──[fits]──▶ summarize(whole) ───────────────────────▶ summary
//!              └─[too long]──▶ split ──▶ summarize(chunk) × n ──▶ reduce ──▶ summary
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tldr_core::{MockSummarizer, Pipeline, PipelineOptions};
//!
//! # async fn run() -> Result<(), tldr_core::PipelineError> {
//! let pipeline = Pipeline::new(Arc::new(MockSummarizer::new()));
//! let result = pipeline.tldr("Some long text.", &PipelineOptions::default()).await?;
//! println!("{}", result.summary);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod estimator;
pub mod events;
pub mod options;
pub mod pipeline;
pub mod reducer;
pub mod retry;
pub mod splitter;
pub mod summarizer;
pub mod tree;

pub use errors::{CallSite, CancelReason, PartialSummaries, PipelineError, Stage};
pub use estimator::{CharCountEstimator, EstimatorKind, LengthEstimator, WordCountEstimator};
pub use events::{EventBus, PipelineEvent, SharedEventBus};
pub use options::PipelineOptions;
pub use pipeline::{tldr, Pipeline, PipelineResult};
pub use reducer::{ReduceOutcome, Reducer};
pub use retry::RetryPolicy;
pub use splitter::{split, BreakKind, Chunk, TextSpan};
pub use summarizer::{MockSummarizer, SummaryKind, SummaryRequest, Summarizer, SummarizerError};
pub use tree::SummaryNode;

// Re-exported for callers wiring cancellation without a direct dependency.
pub use tokio_util::sync::CancellationToken;
