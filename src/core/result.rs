//! Result aggregation - turns stage outcomes into a pipeline verdict

use crate::core::state::{StageOutcome, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline-level verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Success,
    Failure,
}

impl OverallStatus {
    /// Process exit code for this verdict
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Success => 0,
            OverallStatus::Failure => 1,
        }
    }
}

/// Aggregated outcomes of a run, in document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub outcomes: Vec<StageOutcome>,
    pub overall_status: OverallStatus,
}

/// Aggregate stage outcomes into a pipeline result
///
/// Failure iff some stage failed and its soft-fail policy does not cover
/// the exit code. Outcomes are kept verbatim.
pub fn aggregate(outcomes: &[StageOutcome]) -> PipelineResult {
    let overall_status = if outcomes.iter().any(StageOutcome::is_hard_failure) {
        OverallStatus::Failure
    } else {
        OverallStatus::Success
    };

    PipelineResult {
        outcomes: outcomes.to_vec(),
        overall_status,
    }
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.overall_status == OverallStatus::Success
    }

    /// Failures that decide the verdict
    pub fn hard_failures(&self) -> Vec<&StageOutcome> {
        self.outcomes.iter().filter(|o| o.is_hard_failure()).collect()
    }

    /// Advisory failures
    pub fn soft_failures(&self) -> Vec<&StageOutcome> {
        self.outcomes.iter().filter(|o| o.is_soft_failure()).collect()
    }

    /// Number of stages with this status
    pub fn count(&self, status: StageStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Stages with at least one failed cleanup
    pub fn cleanup_failures(&self) -> Vec<&StageOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !o.cleanup_failures.is_empty())
            .collect()
    }

    /// Look up an outcome by stage key
    pub fn outcome_by_key(&self, key: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.key.as_deref() == Some(key))
    }
}

/// Everything known about one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub pipeline_name: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Whether the run was cancelled before finishing
    pub cancelled: bool,

    pub result: PipelineResult,
}

impl PipelineReport {
    /// Final verdict; a cancelled run never succeeds
    pub fn overall_status(&self) -> OverallStatus {
        if self.cancelled {
            OverallStatus::Failure
        } else {
            self.result.overall_status
        }
    }

    /// Process exit code for the run
    pub fn exit_code(&self) -> i32 {
        self.overall_status().exit_code()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.completed_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
