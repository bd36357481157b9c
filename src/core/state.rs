//! Stage outcome models

use crate::core::stage::{SoftFail, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Stage did not run (ineligible, halted or cancelled)
    Skipped,
    /// Every command exited with status 0
    Passed,
    /// A command failed, timed out or was cancelled
    Failed,
}

/// A cleanup command that did not succeed
///
/// Recorded next to the stage status; never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub command: String,
    pub exit_code: i32,
    pub error: String,
}

/// Outcome of one stage in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage position in the document (0-based)
    pub index: usize,

    pub label: String,

    pub key: Option<String>,

    pub status: StageStatus,

    /// Exit code of the failing command, 0 otherwise
    pub exit_code: i32,

    /// Index into the stage's commands of the command that failed
    pub command_index_failed: Option<usize>,

    /// Soft-fail policy of the stage
    pub soft_fail: SoftFail,

    /// Error message for failed stages
    pub error: Option<String>,

    /// Why the stage did not run
    pub skip_reason: Option<String>,

    pub cleanup_failures: Vec<CleanupFailure>,

    /// Last output lines, for diagnostics
    pub output_tail: Vec<String>,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl StageOutcome {
    fn for_stage(stage: &Stage, status: StageStatus) -> Self {
        Self {
            index: stage.index,
            label: stage.label.clone(),
            key: stage.key.clone(),
            status,
            exit_code: 0,
            command_index_failed: None,
            soft_fail: stage.soft_fail.clone(),
            error: None,
            skip_reason: None,
            cleanup_failures: Vec::new(),
            output_tail: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    /// A stage that never ran
    pub fn skipped(stage: &Stage, reason: impl Into<String>) -> Self {
        let mut outcome = Self::for_stage(stage, StageStatus::Skipped);
        outcome.skip_reason = Some(reason.into());
        outcome
    }

    /// A stage whose commands all succeeded
    pub fn passed(stage: &Stage) -> Self {
        Self::for_stage(stage, StageStatus::Passed)
    }

    /// A stage that failed at `command_index` (if a command was running)
    pub fn failed(
        stage: &Stage,
        exit_code: i32,
        command_index: Option<usize>,
        error: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::for_stage(stage, StageStatus::Failed);
        outcome.exit_code = exit_code;
        outcome.command_index_failed = command_index;
        outcome.error = Some(error.into());
        outcome
    }

    /// Name used in reports; unique even when labels repeat
    pub fn display_name(&self) -> String {
        format!("#{} {}", self.index + 1, self.label)
    }

    /// Failed, and the soft-fail policy does not cover it
    pub fn is_hard_failure(&self) -> bool {
        self.status == StageStatus::Failed && !self.soft_fail.covers(self.exit_code)
    }

    /// Failed, but only advisory
    pub fn is_soft_failure(&self) -> bool {
        self.status == StageStatus::Failed && self.soft_fail.covers(self.exit_code)
    }

    /// Wall-clock duration, when the stage ran
    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }
}
