//! Execution scheduler - decides how many stages run at once and when to stop

use crate::core::state::StageOutcome;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Strategy for scheduling stage execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Run stages one at a time in document order; a hard failure halts the rest
    Sequential,

    /// Run all eligible stages concurrently
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent stages)
    LimitedParallel(usize),
}

/// Result of waiting for a concurrency slot
#[derive(Debug)]
pub enum Admission {
    /// The stage may start; the permit (if any) is released on drop
    Admitted(Option<OwnedSemaphorePermit>),
    /// The run was cancelled while waiting
    Cancelled,
}

/// Scheduler state for one pipeline run
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
    permits: Option<Arc<Semaphore>>,
    halted_by: Option<String>,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        let permits = match strategy {
            SchedulingStrategy::LimitedParallel(max) => Some(Arc::new(Semaphore::new(max.max(1)))),
            SchedulingStrategy::Sequential | SchedulingStrategy::Parallel => None,
        };

        Self {
            strategy,
            permits,
            halted_by: None,
        }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Whether stages run one at a time, in order
    pub fn is_sequential(&self) -> bool {
        self.strategy == SchedulingStrategy::Sequential
    }

    /// Concurrency slots shared by the stage tasks, if limited
    pub fn permits(&self) -> Option<Arc<Semaphore>> {
        self.permits.clone()
    }

    /// Record a finished stage
    ///
    /// Returns true when this outcome halts the run (sequential mode only).
    pub fn record(&mut self, outcome: &StageOutcome) -> bool {
        if self.is_sequential() && self.halted_by.is_none() && outcome.is_hard_failure() {
            self.halted_by = Some(outcome.display_name());
            return true;
        }
        false
    }

    /// Why remaining stages must not start, if the run is halted
    pub fn halt_reason(&self) -> Option<String> {
        self.halted_by
            .as_ref()
            .map(|stage| format!("halted after {} failed", stage))
    }
}

/// Wait for a slot, giving up when the run is cancelled
pub async fn admit(permits: Option<Arc<Semaphore>>, cancel: &CancellationToken) -> Admission {
    let Some(permits) = permits else {
        return Admission::Admitted(None);
    };

    tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => Admission::Admitted(Some(permit)),
            Err(_) => Admission::Cancelled,
        },
        _ = cancel.cancelled() => Admission::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::load;

    fn outcomes() -> (StageOutcome, StageOutcome) {
        let pipeline = load(
            "- label: Lint\n  commands: [a]\n- label: Docs\n  commands: [b]\n  soft_fail: true\n",
        )
        .unwrap();
        (
            StageOutcome::failed(&pipeline.stages[0], 1, Some(0), "lint failed"),
            StageOutcome::failed(&pipeline.stages[1], 1, Some(0), "docs failed"),
        )
    }

    #[test]
    fn test_sequential_halts_on_hard_failure() {
        let (hard, _) = outcomes();
        let mut scheduler = ExecutionScheduler::new(SchedulingStrategy::Sequential);

        assert!(scheduler.halt_reason().is_none());
        assert!(scheduler.record(&hard));
        assert_eq!(scheduler.halt_reason().unwrap(), "halted after #1 Lint failed");

        // Only the first failure halts
        assert!(!scheduler.record(&hard));
    }

    #[test]
    fn test_soft_failure_does_not_halt() {
        let (_, soft) = outcomes();
        let mut scheduler = ExecutionScheduler::new(SchedulingStrategy::Sequential);

        assert!(!scheduler.record(&soft));
        assert!(scheduler.halt_reason().is_none());
    }

    #[test]
    fn test_parallel_never_halts() {
        let (hard, _) = outcomes();
        let mut scheduler = ExecutionScheduler::new(SchedulingStrategy::Parallel);

        assert!(!scheduler.record(&hard));
        assert!(scheduler.halt_reason().is_none());
        assert!(scheduler.permits().is_none());
    }

    #[tokio::test]
    async fn test_limited_parallel_admission() {
        let scheduler = ExecutionScheduler::new(SchedulingStrategy::LimitedParallel(1));
        let cancel = CancellationToken::new();

        let first = admit(scheduler.permits(), &cancel).await;
        assert!(matches!(first, Admission::Admitted(Some(_))));
        assert_eq!(scheduler.permits().unwrap().available_permits(), 0);

        // A second stage waits until the run is cancelled
        let waiter = {
            let permits = scheduler.permits();
            let cancel = cancel.clone();
            tokio::spawn(async move { admit(permits, &cancel).await })
        };
        cancel.cancel();
        assert!(matches!(waiter.await.unwrap(), Admission::Cancelled));

        drop(first);
        assert_eq!(scheduler.permits().unwrap().available_permits(), 1);
    }

    #[test]
    fn test_zero_limit_still_admits_one() {
        let scheduler = ExecutionScheduler::new(SchedulingStrategy::LimitedParallel(0));
        assert_eq!(scheduler.permits().unwrap().available_permits(), 1);
    }
}
