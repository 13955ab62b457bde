//! Bounded-parallel sweep execution.
//!
//! Workers pull the next combination index from a shared cursor and write
//! their outcome into that index's slot, so the report is ordered by index
//! whatever the completion order. A failing combination never stops the
//! others unless fail-fast is on; a cancellation lets running combinations
//! finish and marks the rest `Cancelled`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::report::{CombinationFailure, CombinationResult, SweepReport};
use super::state::CombinationStateError;
use super::{cardinality, combination_at, Combination, SweepAxis};
use crate::error::ComposeError;
use crate::signal::CancellationToken;

/// Upper bound accepted for `max_parallel`.
pub const MAX_PARALLEL_LIMIT: usize = 256;

/// Execution policy for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOptions {
    /// Worker threads, at least 1
    pub max_parallel: usize,
    /// Stop starting combinations after the first failure
    pub fail_fast: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            fail_fast: false,
        }
    }
}

/// Runs a job once per combination of a set of axes.
pub struct SweepExecutor {
    options: SweepOptions,
    cancel: CancellationToken,
}

impl SweepExecutor {
    pub fn new(options: SweepOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe `token` for shutdown requests.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> SweepOptions {
        self.options
    }

    /// Run `job` for every combination of `axes`.
    pub fn run<F>(&self, sweep_id: &str, axes: &[SweepAxis], job: F) -> SweepReport
    where
        F: Fn(&Combination) -> Result<(), ComposeError> + Sync,
    {
        let started = Instant::now();
        let total = cardinality(axes);
        let workers = self.options.max_parallel.clamp(1, MAX_PARALLEL_LIMIT).min(total.max(1));

        info!(sweep_id, combinations = total, workers, fail_fast = self.options.fail_fast, "starting sweep");

        let slots: Vec<Mutex<Option<CombinationResult>>> =
            (0..total).map(|_| Mutex::new(None)).collect();
        let cursor = AtomicUsize::new(0);
        let tripped = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(axes, &job, &slots, &cursor, &tripped));
            }
        });

        let fail_fast_tripped = tripped.load(Ordering::SeqCst);
        let cancelled = self.cancel.is_cancelled();

        let results: Vec<CombinationResult> = slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let filled = slot.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
                filled.or_else(|| Self::unstarted(axes, index, cancelled))
            })
            .collect();

        let labels = axes.iter().map(SweepAxis::label).collect();
        let duration_ms = started.elapsed().as_millis() as u64;
        let report = SweepReport::from_results(
            sweep_id.to_string(),
            labels,
            results,
            fail_fast_tripped,
            duration_ms,
        );

        info!(
            sweep_id,
            status = ?report.status,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            skipped = report.skipped,
            "sweep finished"
        );
        report
    }

    fn worker<F>(
        &self,
        axes: &[SweepAxis],
        job: &F,
        slots: &[Mutex<Option<CombinationResult>>],
        cursor: &AtomicUsize,
        tripped: &AtomicBool,
    ) where
        F: Fn(&Combination) -> Result<(), ComposeError> + Sync,
    {
        loop {
            if self.cancel.is_cancelled() || tripped.load(Ordering::SeqCst) {
                return;
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(combination) = combination_at(axes, index) else {
                return;
            };
            // A stop may have landed between the check and the claim.
            if self.cancel.is_cancelled() || tripped.load(Ordering::SeqCst) {
                return;
            }

            let result = self.run_one(&combination, job);
            if result.failure.is_some() && self.options.fail_fast {
                warn!(index, "combination failed, fail-fast stops the sweep");
                tripped.store(true, Ordering::SeqCst);
            }
            if let Some(slot) = slots.get(index) {
                let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                *guard = Some(result);
            }
        }
    }

    fn run_one<F>(&self, combination: &Combination, job: &F) -> CombinationResult
    where
        F: Fn(&Combination) -> Result<(), ComposeError> + Sync,
    {
        let mut result = CombinationResult::queued(combination);
        let started = Instant::now();
        checked(result.start());
        debug!(index = combination.index, output_id = %result.output_id, "combination started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(combination)));
        let elapsed = started.elapsed().as_millis() as u64;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(CombinationFailure::from_error(&err)),
            Err(payload) => Some(CombinationFailure::panicked(panic_message(payload.as_ref()))),
        };

        match failure {
            None => {
                checked(result.succeed(elapsed));
                debug!(index = combination.index, elapsed_ms = elapsed, "combination succeeded");
            }
            Some(failure) => {
                warn!(index = combination.index, error = %failure.message, "combination failed");
                checked(result.fail(failure, elapsed));
            }
        }
        result
    }

    fn unstarted(axes: &[SweepAxis], index: usize, cancelled: bool) -> Option<CombinationResult> {
        let combination = combination_at(axes, index)?;
        let mut result = CombinationResult::queued(&combination);
        checked(if cancelled { result.cancel() } else { result.skip() });
        Some(result)
    }
}

/// Results here start QUEUED, so a refused transition is a bug.
fn checked(transition: Result<(), CombinationStateError>) {
    if let Err(err) = transition {
        debug_assert!(false, "{}", err);
        warn!(error = %err, "illegal combination state transition");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("combination panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("combination panicked: {}", s)
    } else {
        "combination panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instantiate::InstantiateError;
    use crate::sweep::{CombinationState, SweepStatus};
    use scomp_override::OverrideKind;
    use scomp_spec::ConfigPath;
    use serde_json::json;
    use std::collections::HashSet;

    fn axes_2x3() -> Vec<SweepAxis> {
        vec![
            SweepAxis::field(
                OverrideKind::Change,
                ConfigPath::parse("grid.width").unwrap(),
                vec![json!(10), json!(15)],
            ),
            SweepAxis::field(
                OverrideKind::Change,
                ConfigPath::parse("grid.color").unwrap(),
                vec![json!("red"), json!("green"), json!("blue")],
            ),
        ]
    }

    fn construction_failure() -> ComposeError {
        ComposeError::Instantiate(InstantiateError::UnknownTarget {
            target: "Ghost".to_string(),
            path: "grid".to_string(),
        })
    }

    #[test]
    fn test_partial_failure_keeps_going() {
        for max_parallel in [1, 4] {
            let executor = SweepExecutor::new(SweepOptions {
                max_parallel,
                fail_fast: false,
            });
            let report = executor.run("sweep", &axes_2x3(), |c| {
                if c.index == 2 {
                    Err(construction_failure())
                } else {
                    Ok(())
                }
            });

            assert_eq!(report.combination_count, 6);
            assert_eq!(report.succeeded_indices(), vec![0, 1, 3, 4, 5]);
            assert_eq!(report.failed_indices(), vec![2]);
            assert_eq!(report.status, SweepStatus::Success);
            let failed = report.result(2).unwrap();
            assert_eq!(failed.choices[1].value, json!("blue"));
            assert_eq!(failed.failure.as_ref().unwrap().kind, "instantiate");
        }
    }

    #[test]
    fn test_results_indexed_regardless_of_completion_order() {
        let executor = SweepExecutor::new(SweepOptions {
            max_parallel: 6,
            fail_fast: false,
        });
        let report = executor.run("sweep", &axes_2x3(), |c| {
            // Earlier indices finish last.
            std::thread::sleep(std::time::Duration::from_millis(((6 - c.index) * 5) as u64));
            Ok(())
        });
        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        let ids: HashSet<&str> = report.results.iter().map(|r| r.output_id.as_str()).collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_fail_fast_skips_rest() {
        let executor = SweepExecutor::new(SweepOptions {
            max_parallel: 1,
            fail_fast: true,
        });
        let report = executor.run("sweep", &axes_2x3(), |c| {
            if c.index == 1 {
                Err(construction_failure())
            } else {
                Ok(())
            }
        });
        assert!(report.fail_fast_tripped);
        assert_eq!(report.status, SweepStatus::Failed);
        assert_eq!(report.succeeded_indices(), vec![0]);
        assert_eq!(report.indices_in(CombinationState::Skipped), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_cancel_marks_unstarted_cancelled() {
        let token = CancellationToken::new();
        let executor = SweepExecutor::new(SweepOptions {
            max_parallel: 1,
            fail_fast: false,
        })
        .with_cancellation(token.clone());

        let report = executor.run("sweep", &axes_2x3(), |c| {
            if c.index == 1 {
                token.cancel();
            }
            Ok(())
        });

        // The in-flight combination finishes; nothing after it starts.
        assert_eq!(report.succeeded_indices(), vec![0, 1]);
        assert_eq!(report.indices_in(CombinationState::Cancelled), vec![2, 3, 4, 5]);
        assert_eq!(report.status, SweepStatus::Cancelled);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_panic_is_contained() {
        let executor = SweepExecutor::new(SweepOptions::default());
        let report = executor.run("sweep", &axes_2x3(), |c| {
            if c.index == 0 {
                panic!("factory exploded");
            }
            Ok(())
        });
        assert_eq!(report.failed_indices(), vec![0]);
        let failure = report.result(0).unwrap().failure.as_ref().unwrap();
        assert!(failure.message.contains("factory exploded"));
        assert_eq!(report.succeeded, 5);
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let executor = SweepExecutor::new(SweepOptions {
            max_parallel: 2,
            fail_fast: false,
        });
        executor.run("sweep", &axes_2x3(), |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_no_axes_runs_once() {
        let calls = AtomicUsize::new(0);
        let executor = SweepExecutor::new(SweepOptions::default());
        let report = executor.run("sweep", &[], |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.results[0].output_id, "0");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid state transition")]
    fn test_illegal_transition_is_caught() {
        let combination = combination_at(&[], 0).unwrap();
        let mut result = CombinationResult::queued(&combination);
        checked(result.start());
        checked(result.succeed(1));
        checked(result.start());
    }

    #[test]
    fn test_every_result_is_terminal() {
        let executor = SweepExecutor::new(SweepOptions {
            max_parallel: 2,
            fail_fast: true,
        });
        let report = executor.run("sweep", &axes_2x3(), |c| {
            if c.index == 1 {
                Err(ComposeError::Cancelled)
            } else {
                Ok(())
            }
        });
        assert!(report.results.iter().all(|r| r.state.is_terminal()));
    }

    #[test]
    fn test_empty_axis_fails_sweep() {
        let axes = vec![SweepAxis::group("theme", vec![])];
        let report = SweepExecutor::new(SweepOptions::default()).run("sweep", &axes, |_| Ok(()));
        assert_eq!(report.combination_count, 0);
        assert_eq!(report.status, SweepStatus::Failed);
    }
}
