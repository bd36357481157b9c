//! Test: soft failures are advisory

use crate::helpers::*;
use stagerun::core::{OverallStatus, TriggerContext};
use stagerun::execution::SchedulingStrategy;

#[tokio::test]
async fn test_soft_failure_keeps_pipeline_green() {
    let yaml = r#"
- label: "Build"
  commands: ["build"]
- label: "Flaky lint"
  soft_fail: true
  commands: ["lint"]
"#;
    let runner = MockRunner::new().failing("lint", 1);
    let result = run_pipeline_with_mock(yaml, &TriggerContext::new(), SchedulingStrategy::Parallel, runner).await;

    assert_stage_failed(&result.report, "Flaky lint");
    assert_eq!(result.report.overall_status(), OverallStatus::Success);
    assert_eq!(result.report.exit_code(), 0);
    assert_eq!(result.report.result.soft_failures().len(), 1);
    assert!(result.report.result.hard_failures().is_empty());
}

#[tokio::test]
async fn test_hard_failure_turns_pipeline_red() {
    let yaml = r#"
- label: "Build"
  commands: ["build"]
- label: "Lint"
  commands: ["lint"]
"#;
    let runner = MockRunner::new().failing("lint", 1);
    let result = run_pipeline_with_mock(yaml, &TriggerContext::new(), SchedulingStrategy::Parallel, runner).await;

    assert_stage_passed(&result.report, "Build");
    assert_stage_failed(&result.report, "Lint");
    assert_eq!(result.report.overall_status(), OverallStatus::Failure);
    assert_eq!(result.report.exit_code(), 1);
}

#[tokio::test]
async fn test_exit_status_rules_only_cover_listed_codes() {
    let yaml = r#"
- label: "Audit"
  soft_fail:
    - exit_status: 2
  commands: ["audit"]
"#;
    let covered = run_pipeline_with_mock(
        yaml,
        &TriggerContext::new(),
        SchedulingStrategy::Sequential,
        MockRunner::new().failing("audit", 2),
    )
    .await;
    assert_eq!(covered.report.overall_status(), OverallStatus::Success);

    let uncovered = run_pipeline_with_mock(
        yaml,
        &TriggerContext::new(),
        SchedulingStrategy::Sequential,
        MockRunner::new().failing("audit", 3),
    )
    .await;
    assert_stage_failed(&uncovered.report, "Audit");
    assert_eq!(uncovered.report.overall_status(), OverallStatus::Failure);
}

#[tokio::test]
async fn test_wildcard_exit_status_rule() {
    let yaml = r#"
- label: "Audit"
  soft_fail:
    - exit_status: "*"
  commands: ["audit"]
"#;
    let result = run_pipeline_with_mock(
        yaml,
        &TriggerContext::new(),
        SchedulingStrategy::Sequential,
        MockRunner::new().failing("audit", 42),
    )
    .await;
    assert_eq!(result.report.overall_status(), OverallStatus::Success);
}
