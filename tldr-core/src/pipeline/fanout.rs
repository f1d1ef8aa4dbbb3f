//! Bounded concurrent fan-out with position-indexed results.
//!
//! ```text
//! jobs[0..n] ──▶ JoinSet::spawn × n ──▶ Semaphore(concurrency) ──▶ slots[idx]
//! ```
//!
//! Results land in the slot of the job that produced them, so completion
//! order never leaks into output order. The first failure aborts the rest.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{CancelReason, PipelineError, Stage};

// ── RunGuard ─────────────────────────────────────────────────────────────────

/// Cancellation token plus optional deadline for one run.
#[derive(Debug, Clone)]
pub struct RunGuard {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunGuard {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    /// Why the run must stop, if it must.
    pub fn interrupted(&self) -> Option<CancelReason> {
        if self.cancel.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::TimedOut),
            _ => None,
        }
    }

    /// Resolves once the token fires or the deadline passes.
    pub async fn wait(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => CancelReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelReason::TimedOut,
            },
            None => {
                self.cancel.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }
}

// ── fan_out ──────────────────────────────────────────────────────────────────

/// How a fan-out ended early.
#[derive(Debug)]
pub enum FanOutError<T> {
    /// A job failed; the remaining jobs were aborted.
    Failed(PipelineError),
    /// The guard fired; `completed` holds whatever had finished.
    Interrupted {
        reason: CancelReason,
        completed: Vec<Option<T>>,
    },
}

/// Run `count` jobs, at most `concurrency` at a time, and return their
/// results in job order.
///
/// `make(idx)` builds the future for job `idx`; it must own everything it
/// touches.
pub async fn fan_out<T, F, Fut>(
    count: usize,
    concurrency: usize,
    guard: &RunGuard,
    stage: Stage,
    mut make: F,
) -> Result<Vec<T>, FanOutError<T>>
where
    T: Send + 'static,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set: JoinSet<(usize, Result<T, PipelineError>)> = JoinSet::new();

    for idx in 0..count {
        let semaphore = semaphore.clone();
        let job = make(idx);
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        idx,
                        Err(PipelineError::Internal {
                            stage,
                            message: "fan-out semaphore closed".to_string(),
                        }),
                    )
                }
            };
            (idx, job.await)
        });
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();

    loop {
        tokio::select! {
            biased;

            reason = guard.wait() => {
                join_set.abort_all();
                let done = slots.iter().filter(|s| s.is_some()).count();
                warn!(%stage, %reason, completed = done, total = count, "fan-out interrupted");
                return Err(FanOutError::Interrupted { reason, completed: slots });
            }

            joined = join_set.join_next() => match joined {
                None => break,
                Some(Ok((idx, Ok(value)))) => {
                    debug!(%stage, slot = idx, "fan-out job finished");
                    slots[idx] = Some(value);
                }
                Some(Ok((idx, Err(err)))) => {
                    join_set.abort_all();
                    warn!(%stage, slot = idx, error = %err, "fan-out job failed, aborting siblings");
                    return Err(FanOutError::Failed(err));
                }
                Some(Err(join_err)) => {
                    join_set.abort_all();
                    return Err(FanOutError::Failed(PipelineError::Internal {
                        stage,
                        message: format!("worker task failed: {join_err}"),
                    }));
                }
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| {
                FanOutError::Failed(PipelineError::Internal {
                    stage,
                    message: format!("slot {idx} was never filled"),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn open_guard() -> RunGuard {
        RunGuard::new(CancellationToken::new(), None)
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_job_order_not_completion_order() {
        // Later jobs finish first.
        let out = fan_out(5, 5, &open_guard(), Stage::SummarizeChunks, |idx| async move {
            tokio::time::sleep(Duration::from_millis(100 - idx as u64 * 20)).await;
            Ok(idx * 10)
        })
        .await
        .unwrap();
        assert_eq!(out, vec![0, 10, 20, 30, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let out = fan_out(12, 3, &open_guard(), Stage::Reduce, |idx| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(idx)
            }
        })
        .await
        .unwrap();
        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn first_failure_is_returned() {
        let result = fan_out(4, 2, &open_guard(), Stage::SummarizeChunks, |idx| async move {
            if idx == 2 {
                Err(PipelineError::EmptyInput)
            } else {
                Ok(idx)
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(FanOutError::Failed(PipelineError::EmptyInput))
        ));
    }

    #[tokio::test]
    async fn zero_jobs_yield_empty_results() {
        let out: Vec<usize> = fan_out(0, 2, &open_guard(), Stage::Reduce, |idx| async move { Ok(idx) })
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_and_keeps_finished_slots() {
        let guard = RunGuard::new(
            CancellationToken::new(),
            Some(Instant::now() + Duration::from_millis(50)),
        );
        let result = fan_out(3, 3, &guard, Stage::SummarizeChunks, |idx| async move {
            let delay = if idx == 0 { 10 } else { 10_000 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(idx)
        })
        .await;
        match result {
            Err(FanOutError::Interrupted { reason, completed }) => {
                assert_eq!(reason, CancelReason::TimedOut);
                assert_eq!(completed, vec![Some(0), None, None]);
            }
            other => panic!("expected interruption, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = RunGuard::new(token, None);
        assert_eq!(guard.interrupted(), Some(CancelReason::Cancelled));
        let result = fan_out(2, 1, &guard, Stage::Reduce, |idx| async move { Ok(idx) }).await;
        assert!(matches!(
            result,
            Err(FanOutError::Interrupted {
                reason: CancelReason::Cancelled,
                ..
            })
        ));
    }
}
