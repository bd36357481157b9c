//! Stage executor - runs one stage's command sequence with guaranteed cleanup

use crate::{
    core::{
        condition::{evaluate, TriggerContext},
        error::CommandError,
        stage::{Stage, StageCommand},
        state::{CleanupFailure, StageOutcome},
    },
    execution::{
        runner::{CommandRunner, CommandSpec},
        sink::{NullSink, OutputCapture, OutputSink},
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Skip reason for stages that never started because the run was cancelled
pub const CANCELLED_REASON: &str = "pipeline cancelled";

/// Tunables for stage execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Output lines kept per stage for diagnostics
    pub tail_lines: usize,

    /// Upper bound for each cleanup command
    pub cleanup_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tail_lines: 20,
            cleanup_timeout: Duration::from_secs(600),
        }
    }
}

/// Command position and cleanups registered so far
#[derive(Debug, Default)]
struct Progress {
    current: Option<usize>,
    cleanups: Vec<String>,
}

/// Outcome for a stage that must not start, if any
///
/// Ineligible stages are skipped with the evaluator's reason; eligible stages
/// are skipped once the run is cancelled.
pub fn precheck(stage: &Stage, context: &TriggerContext, cancel: &CancellationToken) -> Option<StageOutcome> {
    if let Some(reason) = evaluate(stage, context).skip_reason() {
        info!("Skipping stage {}: {}", stage.display_name(), reason);
        return Some(StageOutcome::skipped(stage, reason));
    }
    if cancel.is_cancelled() {
        info!("Skipping stage {}: {}", stage.display_name(), CANCELLED_REASON);
        return Some(StageOutcome::skipped(stage, CANCELLED_REASON));
    }
    None
}

/// Executes a single stage
pub struct StageExecutor<R> {
    runner: R,
    sink: Arc<dyn OutputSink>,
    config: ExecutorConfig,
}

impl<R: CommandRunner> StageExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            sink: Arc::new(NullSink),
            config: ExecutorConfig::default(),
        }
    }

    /// Send command output to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run a stage if it is eligible under `context`
    pub async fn run(
        &self,
        stage: &Stage,
        env: &BTreeMap<String, String>,
        context: &TriggerContext,
        cancel: &CancellationToken,
    ) -> StageOutcome {
        if let Some(outcome) = precheck(stage, context, cancel) {
            return outcome;
        }
        self.execute(stage, env, cancel).await
    }

    /// Run a stage's commands unconditionally
    ///
    /// Stops at the first failing command. Every registered cleanup runs
    /// exactly once afterwards, whatever the result.
    pub async fn execute(
        &self,
        stage: &Stage,
        env: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> StageOutcome {
        let name = stage.display_name();
        info!("Running stage {}", name);

        let started_at = Utc::now();
        let env = stage_env(stage, env);
        let output = OutputCapture::new(name.clone(), self.sink.clone(), self.config.tail_lines);
        let mut progress = Progress {
            current: None,
            cleanups: stage.cleanup.clone(),
        };

        let result = {
            let body = self.run_commands(stage, &env, &output, cancel, &mut progress);
            match stage.timeout {
                Some(limit) => timeout(limit, body).await.unwrap_or_else(|_| {
                    Err(CommandError::Timeout {
                        command: String::new(),
                        secs: limit.as_secs(),
                    })
                }),
                None => body.await,
            }
        };

        // The timeout error cannot see which command was running
        let result = match result {
            Err(CommandError::Timeout { secs, .. }) => Err(CommandError::Timeout {
                command: progress
                    .current
                    .and_then(|i| stage.commands.get(i))
                    .map(StageCommand::display)
                    .unwrap_or_default(),
                secs,
            }),
            other => other,
        };

        let cleanup_failures = self.run_cleanups(stage, &env, &output, &progress.cleanups).await;

        let mut outcome = match result {
            Ok(()) => {
                info!("Stage {} passed", name);
                StageOutcome::passed(stage)
            }
            Err(err) => {
                let outcome = StageOutcome::failed(stage, err.exit_code(), progress.current, err.to_string());
                if outcome.is_soft_failure() {
                    warn!("Stage {} failed (soft fail): {}", name, err);
                } else {
                    error!("Stage {} failed: {}", name, err);
                }
                outcome
            }
        };

        outcome.cleanup_failures = cleanup_failures;
        outcome.output_tail = output.tail().await;
        outcome.started_at = Some(started_at);
        outcome.finished_at = Some(Utc::now());
        outcome
    }

    async fn run_commands(
        &self,
        stage: &Stage,
        env: &BTreeMap<String, String>,
        output: &OutputCapture,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), CommandError> {
        for (index, command) in stage.commands.iter().enumerate() {
            progress.current = Some(index);
            match command {
                StageCommand::RegisterCleanup(cleanup) => {
                    debug!("Stage {} registered cleanup `{}`", stage.display_name(), cleanup);
                    progress.cleanups.push(cleanup.clone());
                }
                StageCommand::Run(line) => {
                    let spec = CommandSpec::new(line.clone(), env.clone());
                    self.runner.run(&spec, output, cancel).await?;
                }
                StageCommand::RunThenRegister { command, cleanup, always } => {
                    let spec = CommandSpec::new(command.clone(), env.clone());
                    let result = self.runner.run(&spec, output, cancel).await;
                    if result.is_ok() || *always {
                        debug!("Stage {} registered cleanup `{}`", stage.display_name(), cleanup);
                        progress.cleanups.push(cleanup.clone());
                    }
                    result?;
                }
            }
        }
        progress.current = None;
        Ok(())
    }

    /// Run cleanups last-registered first; failures are recorded, not raised
    async fn run_cleanups(
        &self,
        stage: &Stage,
        env: &BTreeMap<String, String>,
        output: &OutputCapture,
        cleanups: &[String],
    ) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();
        // Cleanups must run even after the pipeline was cancelled
        let never_cancelled = CancellationToken::new();

        for cleanup in cleanups.iter().rev() {
            debug!("Stage {} running cleanup `{}`", stage.display_name(), cleanup);
            let spec = CommandSpec::new(cleanup.clone(), env.clone());
            let limit = self.config.cleanup_timeout;

            let result = timeout(limit, self.runner.run(&spec, output, &never_cancelled))
                .await
                .unwrap_or_else(|_| {
                    Err(CommandError::Timeout {
                        command: cleanup.clone(),
                        secs: limit.as_secs(),
                    })
                });

            if let Err(err) = result {
                warn!("Cleanup for stage {} failed: {}", stage.display_name(), err);
                failures.push(CleanupFailure {
                    command: cleanup.clone(),
                    exit_code: err.exit_code(),
                    error: err.to_string(),
                });
            }
        }

        failures
    }
}

fn stage_env(stage: &Stage, env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env = env.clone();
    env.insert("STAGERUN_STAGE_LABEL".to_string(), stage.label.clone());
    env.insert("STAGERUN_STAGE_INDEX".to_string(), stage.index.to_string());
    env
}
