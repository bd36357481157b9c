//! Test: sequential mode halts after a hard failure

use crate::helpers::*;
use stagerun::core::{OverallStatus, TriggerContext};
use stagerun::execution::SchedulingStrategy;

const YAML: &str = r#"
name: "Test: Sequential"
steps:
  - label: "Lint"
    soft_fail: true
    commands: ["lint"]
  - label: "Tests"
    commands: ["unit", "integration", "e2e"]
  - label: "Package"
    commands: ["package"]
"#;

#[tokio::test]
async fn test_commands_stop_at_first_failure() {
    let runner = MockRunner::new().failing("integration", 1);
    let result = run_pipeline_with_mock(YAML, &TriggerContext::new(), SchedulingStrategy::Sequential, runner).await;

    let tests = &result.report.result.outcomes[1];
    assert_eq!(tests.command_index_failed, Some(1));
    assert_eq!(tests.exit_code, 1);
    assert!(!result.executed.contains(&"e2e".to_string()));
}

#[tokio::test]
async fn test_hard_failure_skips_later_stages() {
    let runner = MockRunner::new().failing("integration", 1);
    let result = run_pipeline_with_mock(YAML, &TriggerContext::new(), SchedulingStrategy::Sequential, runner).await;

    assert_stage_failed(&result.report, "Tests");
    assert_stage_skipped(&result.report, "Package");
    assert_execution_order(&result, &["lint", "unit", "integration"]);
    assert_eq!(
        result.report.result.outcomes[2].skip_reason.as_deref(),
        Some("halted after #2 Tests failed")
    );
    assert_eq!(result.report.overall_status(), OverallStatus::Failure);
}

#[tokio::test]
async fn test_soft_failure_does_not_halt() {
    let runner = MockRunner::new().failing("lint", 1);
    let result = run_pipeline_with_mock(YAML, &TriggerContext::new(), SchedulingStrategy::Sequential, runner).await;

    assert_stage_failed(&result.report, "Lint");
    assert_stage_passed(&result.report, "Tests");
    assert_stage_passed(&result.report, "Package");
    assert_execution_order(&result, &["lint", "unit", "integration", "e2e", "package"]);
    assert_eq!(result.report.overall_status(), OverallStatus::Success);
}

#[tokio::test]
async fn test_parallel_mode_runs_stages_after_failure() {
    let runner = MockRunner::new().failing("integration", 1);
    let result = run_pipeline_with_mock(YAML, &TriggerContext::new(), SchedulingStrategy::LimitedParallel(2), runner).await;

    assert_stage_failed(&result.report, "Tests");
    assert_stage_passed(&result.report, "Package");
    // Outcomes stay in document order whatever the completion order
    let labels: Vec<&str> = result.report.result.outcomes.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["Lint", "Tests", "Package"]);
}
