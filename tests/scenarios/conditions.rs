//! Test: trigger conditions gate stage eligibility

use crate::helpers::*;
use stagerun::core::{OverallStatus, TriggerContext};
use stagerun::execution::SchedulingStrategy;

const YAML: &str = r#"
name: "Test: Conditions"
steps:
  - label: "Always"
    commands: ["always"]
  - label: "Docs"
    conditions: ["docs_changed"]
    commands: ["docs"]
  - label: "Release"
    conditions: ["is_main", "tagged"]
    commands: ["release"]
"#;

#[tokio::test]
async fn test_unconditional_stage_runs_with_empty_context() {
    let result = run_pipeline_with_mock(YAML, &TriggerContext::new(), SchedulingStrategy::Sequential, MockRunner::new()).await;

    assert_stage_passed(&result.report, "Always");
    assert_stage_skipped(&result.report, "Docs");
    assert_stage_skipped(&result.report, "Release");
    assert_execution_order(&result, &["always"]);
    assert_eq!(result.report.overall_status(), OverallStatus::Success);
}

#[tokio::test]
async fn test_all_conditions_must_hold() {
    let context = TriggerContext::new()
        .with("docs_changed", true)
        .with("is_main", true);
    let result = run_pipeline_with_mock(YAML, &context, SchedulingStrategy::Sequential, MockRunner::new()).await;

    assert_stage_passed(&result.report, "Docs");
    assert_stage_skipped(&result.report, "Release");
    let release = &result.report.result.outcomes[2];
    assert!(release.skip_reason.as_deref().unwrap().contains("tagged"));

    let context = context.with("tagged", true);
    let result = run_pipeline_with_mock(YAML, &context, SchedulingStrategy::Sequential, MockRunner::new()).await;
    assert_stage_passed(&result.report, "Release");
    assert_execution_order(&result, &["always", "docs", "release"]);
}

#[tokio::test]
async fn test_false_condition_skips_stage() {
    let context = TriggerContext::new().with("docs_changed", false);
    let result = run_pipeline_with_mock(YAML, &context, SchedulingStrategy::Parallel, MockRunner::new()).await;

    assert_stage_skipped(&result.report, "Docs");
    assert!(!result.executed.contains(&"docs".to_string()));
}
