//! Test utility functions for stagerun

#![allow(dead_code)]

use async_trait::async_trait;
use stagerun::core::{CommandError, PipelineReport, StageStatus, TriggerContext};
use stagerun::execution::{
    CommandRunner, CommandSpec, ExecutionEngine, OutputCapture, SchedulingStrategy, ShellRunner, StageExecutor,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mock runner with scripted exit codes
///
/// Commands listed in `exit_codes` fail with that code, everything else
/// succeeds. Commands listed in `delays` sleep first (and honour cancel).
#[derive(Default)]
pub struct MockRunner {
    exit_codes: HashMap<String, i32>,
    delays: HashMap<String, Duration>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, command: &str, code: i32) -> Self {
        self.exit_codes.insert(command.to_string(), code);
        self
    }

    pub fn slow(mut self, command: &str, delay: Duration) -> Self {
        self.delays.insert(command.to_string(), delay);
        self
    }

    /// Shared log of executed commands, in start order
    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        self.executed.clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        output: &OutputCapture,
        cancel: &CancellationToken,
    ) -> Result<(), CommandError> {
        self.executed.lock().await.push(spec.command.clone());
        output.push(format!("running {}", spec.command)).await;

        if let Some(delay) = self.delays.get(&spec.command) {
            tokio::select! {
                _ = tokio::time::sleep(*delay) => {}
                _ = cancel.cancelled() => {
                    return Err(CommandError::Cancelled {
                        command: spec.command.clone(),
                    });
                }
            }
        }

        match self.exit_codes.get(&spec.command) {
            Some(code) => Err(CommandError::NonZeroExit {
                command: spec.command.clone(),
                code: *code,
            }),
            None => Ok(()),
        }
    }
}

/// Result of running a pipeline in a test
pub struct TestResult {
    pub report: PipelineReport,
    pub executed: Vec<String>,
}

/// Run a pipeline document with a mock runner
pub async fn run_pipeline_with_mock(
    yaml: &str,
    context: &TriggerContext,
    strategy: SchedulingStrategy,
    runner: MockRunner,
) -> TestResult {
    let pipeline = stagerun::load(yaml).expect("pipeline should load");
    let executed = runner.executed();
    let engine = ExecutionEngine::new(StageExecutor::new(runner), strategy);

    let report = engine.execute(&pipeline, context, CancellationToken::new()).await;
    let executed = executed.lock().await.clone();
    TestResult { report, executed }
}

/// Run a pipeline document through `sh`, inside `workdir`
pub async fn run_pipeline_with_shell(
    yaml: &str,
    context: &TriggerContext,
    strategy: SchedulingStrategy,
    workdir: &std::path::Path,
    cancel: CancellationToken,
) -> PipelineReport {
    let pipeline = stagerun::load(yaml).expect("pipeline should load");
    let runner = ShellRunner::new().with_workdir(workdir);
    let engine = ExecutionEngine::new(StageExecutor::new(runner), strategy);
    engine.execute(&pipeline, context, cancel).await
}

/// Assert a stage (by label) ended with `status`
pub fn assert_stage_status(result: &PipelineReport, label: &str, status: StageStatus) {
    let outcome = result
        .result
        .outcomes
        .iter()
        .find(|o| o.label == label)
        .unwrap_or_else(|| panic!("Stage '{}' not found", label));
    assert_eq!(
        outcome.status, status,
        "Stage '{}' should be {:?}, got {:?} ({:?})",
        label, status, outcome.status, outcome
    );
}

pub fn assert_stage_passed(result: &PipelineReport, label: &str) {
    assert_stage_status(result, label, StageStatus::Passed);
}

pub fn assert_stage_failed(result: &PipelineReport, label: &str) {
    assert_stage_status(result, label, StageStatus::Failed);
}

pub fn assert_stage_skipped(result: &PipelineReport, label: &str) {
    assert_stage_status(result, label, StageStatus::Skipped);
}

/// Assert the exact commands that ran, in order
pub fn assert_execution_order(result: &TestResult, expected: &[&str]) {
    assert_eq!(
        result.executed, expected,
        "Expected execution order {:?}, got {:?}",
        expected, result.executed
    );
}

/// Count lines in a marker file written by shell commands
pub fn count_lines(path: &std::path::Path) -> usize {
    std::fs::read_to_string(path)
        .map(|content| content.lines().count())
        .unwrap_or(0)
}
