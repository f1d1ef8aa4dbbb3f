use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tree::SummaryNode;

/// Final summary of one run plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub summary: String,
    /// 1 when the input fit a single call.
    pub chunk_count: usize,
    /// 1 for a single call, otherwise 1 + merge levels run.
    pub tree_depth: usize,
    /// Logical provider calls made (retries not included).
    pub provider_calls: usize,
    /// Extra tries spent on transient provider failures.
    pub retries: usize,
    /// Sum of estimated input units over all provider calls.
    pub estimated_tokens: usize,
    /// The depth limit forced verbatim concatenation at the top.
    pub truncated_reduction: bool,
    pub tree: SummaryNode,
}
