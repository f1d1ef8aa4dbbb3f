//! Reducer: merge ordered summaries level by level into one.
//!
//! ```text
//! level 0:  L0 L1 L2 L3 L4 | L5 L6 L7 L8 L9 | L10 ... L14 | L15 L16
//! level 1:        M0       |       M1       |     M2      |   M3
//! level 2:                        M'0
//! ```
//!
//! Each level groups the current nodes into consecutive batches of at most
//! `branching_factor`. Batches merge concurrently; levels run one after
//! another. A batch of one is carried up unchanged. When `max_reduce_depth`
//! levels have run and more than one node is left, the remaining summaries
//! are concatenated verbatim under a flagged root.

use std::ops::Range;

use chrono::Utc;
use tracing::{info, warn};

use crate::errors::{CallSite, PartialSummaries, PipelineError, Stage};
use crate::events::PipelineEvent;
use crate::options::PipelineOptions;
use crate::pipeline::context::{CallOutcome, RunContext};
use crate::pipeline::fanout::{fan_out, FanOutError};
use crate::tree::SummaryNode;

/// Separator between sibling summaries in a merge input.
pub const MERGE_SEPARATOR: &str = "\n\n";

/// Result of reducing a sequence of leaves.
#[derive(Debug, Clone)]
pub struct ReduceOutcome {
    pub root: SummaryNode,
    /// Merge levels that ran (verbatim fallback excluded).
    pub levels: usize,
    pub provider_calls: usize,
    pub retries: usize,
    pub estimated_tokens: usize,
    /// The depth limit forced verbatim concatenation.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
struct MergeJob {
    site: CallSite,
    text: String,
    children: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    branching_factor: usize,
    max_depth: usize,
    max_input_units: usize,
}

impl Reducer {
    pub fn new(branching_factor: usize, max_depth: usize, max_input_units: usize) -> Self {
        Self {
            branching_factor: branching_factor.max(2),
            max_depth,
            max_input_units,
        }
    }

    pub fn from_options(options: &PipelineOptions) -> Self {
        Self::new(
            options.branching_factor,
            options.max_reduce_depth,
            options.max_chunk_units,
        )
    }

    /// Reduce `leaves` (document order) to a single root.
    pub async fn reduce(
        &self,
        leaves: Vec<SummaryNode>,
        ctx: &RunContext,
    ) -> Result<ReduceOutcome, PipelineError> {
        if leaves.is_empty() {
            return Err(PipelineError::Internal {
                stage: Stage::Reduce,
                message: "nothing to reduce".to_string(),
            });
        }

        let mut nodes = leaves;
        let mut levels = 0;
        let mut provider_calls = 0;
        let mut retries = 0;
        let mut estimated_tokens = 0;

        while nodes.len() > 1 {
            if levels == self.max_depth {
                let remaining = nodes.len();
                warn!(
                    run_id = %ctx.run_id,
                    levels,
                    remaining,
                    "reduce depth limit reached, concatenating remaining summaries"
                );
                ctx.publish(PipelineEvent::ReductionTruncated {
                    run_id: ctx.run_id,
                    levels,
                    remaining,
                    timestamp: Utc::now(),
                });
                let summary = join_summaries(&nodes);
                return Ok(ReduceOutcome {
                    root: SummaryNode::internal(nodes, summary, true),
                    levels,
                    provider_calls,
                    retries,
                    estimated_tokens,
                    truncated: true,
                });
            }

            if let Some(reason) = ctx.guard.interrupted() {
                return Err(PipelineError::Cancelled {
                    reason,
                    stage: Stage::Reduce,
                    partial: PartialSummaries::default(),
                });
            }

            levels += 1;
            let batches = plan_batches(nodes.len(), self.branching_factor);
            let jobs = self.merge_jobs(levels, &nodes, &batches, ctx);

            info!(
                run_id = %ctx.run_id,
                level = levels,
                inputs = nodes.len(),
                merges = jobs.len(),
                "reduction level started"
            );
            ctx.publish(PipelineEvent::LevelStarted {
                run_id: ctx.run_id,
                level: levels,
                inputs: nodes.len(),
                merges: jobs.len(),
                timestamp: Utc::now(),
            });

            let outcomes = fan_out(jobs.len(), ctx.concurrency, &ctx.guard, Stage::Reduce, |idx| {
                let ctx = ctx.clone();
                let job = jobs[idx].clone();
                async move { ctx.merge(job.site, job.text, job.children).await }
            })
            .await
            .map_err(|err| match err {
                FanOutError::Failed(err) => err,
                FanOutError::Interrupted { reason, .. } => PipelineError::Cancelled {
                    reason,
                    stage: Stage::Reduce,
                    partial: PartialSummaries::default(),
                },
            })?;

            for outcome in &outcomes {
                provider_calls += 1;
                retries += outcome.retries();
                estimated_tokens += outcome.input_units;
            }
            nodes = assemble_level(nodes, &batches, outcomes)?;
        }

        let root = nodes.pop().ok_or_else(|| PipelineError::Internal {
            stage: Stage::Reduce,
            message: "reduction produced no root".to_string(),
        })?;

        Ok(ReduceOutcome {
            root,
            levels,
            provider_calls,
            retries,
            estimated_tokens,
            truncated: false,
        })
    }

    fn merge_jobs(
        &self,
        level: usize,
        nodes: &[SummaryNode],
        batches: &[Range<usize>],
        ctx: &RunContext,
    ) -> Vec<MergeJob> {
        batches
            .iter()
            .enumerate()
            .filter(|(_, range)| range.len() > 1)
            .map(|(batch, range)| {
                let members = &nodes[range.clone()];
                let text = join_summaries(members);
                let site = CallSite::merge(
                    level,
                    batch,
                    members[0].span().0,
                    members[members.len() - 1].span().1,
                );
                let units = ctx.estimator.estimate(&text);
                if units > self.max_input_units {
                    warn!(
                        site = %site,
                        units,
                        max_units = self.max_input_units,
                        "merge input exceeds chunk budget, sending anyway"
                    );
                }
                MergeJob {
                    site,
                    text,
                    children: range.len(),
                }
            })
            .collect()
    }
}

/// Consecutive ranges of at most `branching_factor` items covering `0..count`.
pub fn plan_batches(count: usize, branching_factor: usize) -> Vec<Range<usize>> {
    let size = branching_factor.max(1);
    (0..count)
        .step_by(size)
        .map(|start| start..(start + size).min(count))
        .collect()
}

fn join_summaries(nodes: &[SummaryNode]) -> String {
    nodes
        .iter()
        .map(SummaryNode::summary)
        .collect::<Vec<_>>()
        .join(MERGE_SEPARATOR)
}

/// Replace each multi-node batch with an internal node carrying its merge
/// outcome; single-node batches pass through.
fn assemble_level(
    nodes: Vec<SummaryNode>,
    batches: &[Range<usize>],
    outcomes: Vec<CallOutcome>,
) -> Result<Vec<SummaryNode>, PipelineError> {
    let mut outcomes = outcomes.into_iter();
    let mut remaining = nodes.into_iter();
    let mut next = Vec::with_capacity(batches.len());

    for range in batches {
        let mut members: Vec<SummaryNode> = remaining.by_ref().take(range.len()).collect();
        if members.len() == 1 {
            next.append(&mut members);
            continue;
        }
        let outcome = outcomes.next().ok_or_else(|| PipelineError::Internal {
            stage: Stage::Reduce,
            message: format!("missing merge outcome for batch {range:?}"),
        })?;
        next.push(SummaryNode::internal(members, outcome.summary, false));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::estimator::CharCountEstimator;
    use crate::pipeline::fanout::RunGuard;
    use crate::retry::RetryPolicy;
    use crate::summarizer::MockSummarizer;

    fn context(mock: Arc<MockSummarizer>) -> RunContext {
        RunContext {
            run_id: Uuid::new_v4(),
            summarizer: mock,
            estimator: Arc::new(CharCountEstimator::default()),
            events: None,
            guard: RunGuard::new(CancellationToken::new(), None),
            policy: RetryPolicy::default(),
            style_hint: Arc::from("concise"),
            concurrency: 4,
        }
    }

    fn leaves(n: usize) -> Vec<SummaryNode> {
        (0..n)
            .map(|i| SummaryNode::leaf(i, i * 10, (i + 1) * 10, format!("[P{i}]")))
            .collect()
    }

    #[test]
    fn test_plan_batches() {
        assert_eq!(plan_batches(17, 5), vec![0..5, 5..10, 10..15, 15..17]);
        assert_eq!(plan_batches(5, 5), vec![0..5]);
        assert_eq!(plan_batches(6, 5), vec![0..5, 5..6]);
        assert!(plan_batches(0, 3).is_empty());
    }

    #[tokio::test]
    async fn seventeen_leaves_take_five_merges_over_two_levels() {
        let mock = Arc::new(MockSummarizer::new());
        let ctx = context(mock.clone());
        let out = Reducer::new(5, 4, 2000).reduce(leaves(17), &ctx).await.unwrap();

        assert_eq!(out.provider_calls, 5);
        assert_eq!(mock.calls(), 5);
        assert_eq!(out.levels, 2);
        assert!(!out.truncated);
        assert_eq!(out.root.leaf_count(), 17);
        assert!(out.root.validate_coverage(0, 170).is_ok());
        let expected: Vec<String> = (0..17).map(|i| format!("[P{i}]")).collect();
        assert_eq!(out.root.summary(), expected.join(" "));
    }

    #[tokio::test]
    async fn single_node_batch_passes_through_without_a_call() {
        let mock = Arc::new(MockSummarizer::new());
        let ctx = context(mock.clone());
        // 6 leaves, B=5: level 1 merges 0..5 and carries leaf 5 up.
        let out = Reducer::new(5, 4, 2000).reduce(leaves(6), &ctx).await.unwrap();
        assert_eq!(out.levels, 2);
        assert_eq!(out.provider_calls, 2);
        let root_children = out.root.children();
        assert_eq!(root_children.len(), 2);
        assert!(root_children[1].is_leaf());
    }

    #[tokio::test]
    async fn depth_limit_concatenates_verbatim() {
        let mock = Arc::new(MockSummarizer::new());
        let ctx = context(mock.clone());
        let out = Reducer::new(2, 1, 2000).reduce(leaves(8), &ctx).await.unwrap();

        assert!(out.truncated);
        assert_eq!(out.levels, 1);
        assert_eq!(out.provider_calls, 4);
        assert!(out.root.is_verbatim());
        assert_eq!(out.root.children().len(), 4);
        for i in 0..8 {
            assert!(out.root.summary().contains(&format!("[P{i}]")));
        }
        assert!(out.root.validate_coverage(0, 80).is_ok());
    }

    #[tokio::test]
    async fn single_leaf_is_its_own_root() {
        let mock = Arc::new(MockSummarizer::new());
        let ctx = context(mock.clone());
        let out = Reducer::new(3, 2, 2000).reduce(leaves(1), &ctx).await.unwrap();
        assert_eq!(out.levels, 0);
        assert_eq!(mock.calls(), 0);
        assert!(out.root.is_leaf());
    }

    #[tokio::test]
    async fn cancelled_before_level_makes_no_calls() {
        let mock = Arc::new(MockSummarizer::new());
        let mut ctx = context(mock.clone());
        let token = CancellationToken::new();
        token.cancel();
        ctx.guard = RunGuard::new(token, None);

        let err = Reducer::new(3, 2, 2000).reduce(leaves(4), &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::Reduce,
                ..
            }
        ));
        assert_eq!(mock.calls(), 0);
    }
}
