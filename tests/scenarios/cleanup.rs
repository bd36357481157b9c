//! Test: registered cleanup runs exactly once

use crate::helpers::*;
use stagerun::core::{OverallStatus, TriggerContext};
use stagerun::execution::SchedulingStrategy;

#[tokio::test]
async fn test_trap_cleanup_runs_after_failure() {
    let yaml = r#"
- label: "Tests"
  commands:
    - "trap 'upload-results' EXIT"
    - "pytest"
    - "coverage"
"#;
    let runner = MockRunner::new().failing("pytest", 1);
    let result = run_pipeline_with_mock(yaml, &TriggerContext::new(), SchedulingStrategy::Sequential, runner).await;

    assert_stage_failed(&result.report, "Tests");
    assert_execution_order(&result, &["pytest", "upload-results"]);
    assert_eq!(result.report.result.outcomes[0].command_index_failed, Some(1));
}

#[tokio::test]
async fn test_cleanup_failure_is_reported_separately() {
    let yaml = r#"
- label: "Build"
  cleanup: ["teardown"]
  commands: ["build"]
"#;
    let runner = MockRunner::new().failing("teardown", 4);
    let result = run_pipeline_with_mock(yaml, &TriggerContext::new(), SchedulingStrategy::Parallel, runner).await;

    assert_stage_passed(&result.report, "Build");
    assert_eq!(result.report.overall_status(), OverallStatus::Success);
    assert_eq!(result.report.result.cleanup_failures().len(), 1);
    assert_eq!(result.report.result.outcomes[0].cleanup_failures[0].exit_code, 4);
}

#[tokio::test]
async fn test_skipped_stage_registers_no_cleanup() {
    let yaml = r#"
- label: "Docs"
  conditions: ["docs_changed"]
  cleanup: ["teardown"]
  commands: ["docs"]
"#;
    let result = run_pipeline_with_mock(yaml, &TriggerContext::new(), SchedulingStrategy::Parallel, MockRunner::new()).await;

    assert_stage_skipped(&result.report, "Docs");
    assert!(result.executed.is_empty());
}
