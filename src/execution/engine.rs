//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{
        condition::TriggerContext,
        error::EXIT_SIGNALED,
        pipeline::Pipeline,
        result::{aggregate, OverallStatus, PipelineReport},
        stage::Stage,
        state::{StageOutcome, StageStatus},
    },
    execution::{
        executor::{precheck, ExecutorConfig, StageExecutor, CANCELLED_REASON},
        runner::CommandRunner,
        sink::OutputSink,
        scheduler::{admit, Admission, ExecutionScheduler, SchedulingStrategy},
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_stages: usize,
    },
    StageStarted {
        index: usize,
        label: String,
    },
    StageSkipped {
        index: usize,
        label: String,
        reason: String,
    },
    StageFinished {
        outcome: StageOutcome,
    },
    PipelineHalted {
        index: usize,
        label: String,
    },
    PipelineCancelled {
        execution_id: Uuid,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: OverallStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Engine settings, usually built from CLI flags
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub strategy: SchedulingStrategy,
    pub executor: ExecutorConfig,
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    executor: Arc<StageExecutor<R>>,
    strategy: SchedulingStrategy,
    event_handlers: Vec<EventHandler>,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(executor: StageExecutor<R>, strategy: SchedulingStrategy) -> Self {
        Self {
            executor: Arc::new(executor),
            strategy,
            event_handlers: Vec::new(),
        }
    }

    /// Build an engine around `runner` with output going to `sink`
    pub fn from_config(runner: R, sink: Arc<dyn OutputSink>, config: EngineConfig) -> Self {
        let executor = StageExecutor::new(runner)
            .with_sink(sink)
            .with_config(config.executor);
        Self::new(executor, config.strategy)
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn executor(&self) -> &StageExecutor<R> {
        &self.executor
    }

    /// Execute the entire pipeline
    ///
    /// Never fails: command errors end up in the stage outcomes. Cancelling
    /// `cancel` stops running commands; their cleanups still run.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        context: &TriggerContext,
        cancel: CancellationToken,
    ) -> PipelineReport {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let handlers: Arc<[EventHandler]> = self.event_handlers.clone().into();

        info!(
            "Starting pipeline execution: {} ({}, {:?})",
            pipeline.name, execution_id, self.strategy
        );
        emit(
            &handlers,
            ExecutionEvent::PipelineStarted {
                execution_id,
                pipeline_name: pipeline.name.clone(),
                total_stages: pipeline.len(),
            },
        );

        let mut scheduler = ExecutionScheduler::new(self.strategy);
        let outcomes = if scheduler.is_sequential() {
            self.execute_sequential(pipeline, context, &cancel, &mut scheduler, &handlers, execution_id)
                .await
        } else {
            self.execute_concurrent(pipeline, context, &cancel, &scheduler, &handlers, execution_id)
                .await
        };

        let cancelled = cancel.is_cancelled();
        let report = PipelineReport {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            started_at,
            completed_at: Utc::now(),
            cancelled,
            result: aggregate(&outcomes),
        };

        if cancelled {
            warn!("Pipeline {} was cancelled", pipeline.name);
            emit(&handlers, ExecutionEvent::PipelineCancelled { execution_id });
        }

        let status = report.overall_status();
        info!("Pipeline execution finished: {} - {:?}", pipeline.name, status);
        emit(
            &handlers,
            ExecutionEvent::PipelineCompleted {
                execution_id,
                status,
            },
        );

        report
    }

    async fn execute_sequential(
        &self,
        pipeline: &Pipeline,
        context: &TriggerContext,
        cancel: &CancellationToken,
        scheduler: &mut ExecutionScheduler,
        handlers: &Arc<[EventHandler]>,
        execution_id: Uuid,
    ) -> Vec<StageOutcome> {
        let mut outcomes = Vec::with_capacity(pipeline.len());

        for stage in &pipeline.stages {
            // Once cancelled, stages report the cancellation rather than the halt
            let halt_reason = if cancel.is_cancelled() { None } else { scheduler.halt_reason() };
            let outcome = match halt_reason {
                Some(reason) => {
                    let outcome = StageOutcome::skipped(stage, reason);
                    emit_finished(handlers, &outcome);
                    outcome
                }
                None => {
                    let env = stage_env(pipeline, stage, execution_id);
                    run_stage(&*self.executor, stage, &env, context, cancel, handlers).await
                }
            };

            if !cancel.is_cancelled() && scheduler.record(&outcome) {
                error!("Halting pipeline after {} failed", outcome.display_name());
                emit(
                    handlers,
                    ExecutionEvent::PipelineHalted {
                        index: outcome.index,
                        label: outcome.label.clone(),
                    },
                );
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn execute_concurrent(
        &self,
        pipeline: &Pipeline,
        context: &TriggerContext,
        cancel: &CancellationToken,
        scheduler: &ExecutionScheduler,
        handlers: &Arc<[EventHandler]>,
        execution_id: Uuid,
    ) -> Vec<StageOutcome> {
        let mut slots: Vec<Option<StageOutcome>> = vec![None; pipeline.len()];
        let mut tasks = JoinSet::new();
        let context = Arc::new(context.clone());

        for stage in &pipeline.stages {
            // Ineligible stages resolve immediately and never take a slot
            if let Some(outcome) = precheck(stage, &context, cancel) {
                emit_finished(handlers, &outcome);
                slots[stage.index] = Some(outcome);
                continue;
            }

            let executor = self.executor.clone();
            let stage = stage.clone();
            let env = stage_env(pipeline, &stage, execution_id);
            let context = context.clone();
            let cancel = cancel.clone();
            let handlers = handlers.clone();
            let permits = scheduler.permits();

            tasks.spawn(async move {
                let _permit = match admit(permits, &cancel).await {
                    Admission::Admitted(permit) => permit,
                    Admission::Cancelled => {
                        let outcome = StageOutcome::skipped(&stage, CANCELLED_REASON);
                        emit_finished(&handlers, &outcome);
                        return (stage.index, outcome);
                    }
                };
                let outcome = run_stage(&*executor, &stage, &env, &context, &cancel, &handlers).await;
                (stage.index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Stage task did not complete: {}", e),
            }
        }

        pipeline
            .stages
            .iter()
            .zip(slots)
            .map(|(stage, slot)| {
                slot.unwrap_or_else(|| {
                    let outcome = StageOutcome::failed(stage, EXIT_SIGNALED, None, "stage task aborted");
                    emit_finished(handlers, &outcome);
                    outcome
                })
            })
            .collect()
    }
}

/// Run one stage, emitting start/finish events
async fn run_stage<R: CommandRunner>(
    executor: &StageExecutor<R>,
    stage: &Stage,
    env: &BTreeMap<String, String>,
    context: &TriggerContext,
    cancel: &CancellationToken,
    handlers: &[EventHandler],
) -> StageOutcome {
    if let Some(outcome) = precheck(stage, context, cancel) {
        emit_finished(handlers, &outcome);
        return outcome;
    }

    emit(
        handlers,
        ExecutionEvent::StageStarted {
            index: stage.index,
            label: stage.label.clone(),
        },
    );
    let outcome = executor.execute(stage, env, cancel).await;
    emit_finished(handlers, &outcome);
    outcome
}

fn stage_env(pipeline: &Pipeline, stage: &Stage, execution_id: Uuid) -> BTreeMap<String, String> {
    let mut env = pipeline.env_for_stage(stage);
    env.insert("STAGERUN_EXECUTION_ID".to_string(), execution_id.to_string());
    env
}

fn emit_finished(handlers: &[EventHandler], outcome: &StageOutcome) {
    let event = match outcome.status {
        StageStatus::Skipped => ExecutionEvent::StageSkipped {
            index: outcome.index,
            label: outcome.label.clone(),
            reason: outcome.skip_reason.clone().unwrap_or_default(),
        },
        StageStatus::Passed | StageStatus::Failed => ExecutionEvent::StageFinished {
            outcome: outcome.clone(),
        },
    };
    emit(handlers, event);
}

/// Emit an event to all handlers
fn emit(handlers: &[EventHandler], event: ExecutionEvent) {
    for handler in handlers {
        handler(event.clone());
    }
}
