//! Pipeline orchestration: whole-input fast path, chunk fan-out, reduction.

pub mod context;
pub mod fanout;
pub mod orchestrator;
pub mod result;

use std::sync::Arc;

pub use fanout::{fan_out, FanOutError, RunGuard};
pub use orchestrator::Pipeline;
pub use result::PipelineResult;

use crate::errors::PipelineError;
use crate::options::PipelineOptions;
use crate::summarizer::Summarizer;

/// Summarize `text` with the default estimator and no event bus.
pub async fn tldr(
    summarizer: Arc<dyn Summarizer>,
    text: &str,
    options: &PipelineOptions,
) -> Result<PipelineResult, PipelineError> {
    Pipeline::new(summarizer).tldr(text, options).await
}
