//! CLI command definitions

use crate::core::TriggerContext;
use crate::execution::{EngineConfig, ExecutorConfig, SchedulingStrategy};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Trigger condition flags shared by `run` and `plan`
#[derive(Debug, Args, Clone, Default)]
pub struct ContextArgs {
    /// Trigger condition, as NAME (true) or NAME=true|false
    #[arg(short, long, value_parser = parse_condition)]
    pub condition: Vec<(String, bool)>,

    /// YAML or JSON mapping of condition names to booleans
    #[arg(long)]
    pub context_file: Option<PathBuf>,
}

impl ContextArgs {
    /// Build the trigger context; flags override entries from the file
    pub fn trigger_context(&self) -> Result<TriggerContext> {
        let mut context = match &self.context_file {
            Some(path) => TriggerContext::from_file(path)?,
            None => TriggerContext::new(),
        };
        context.merge(self.condition.iter().cloned().collect());
        Ok(context)
    }
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub context: ContextArgs,

    /// How stages are scheduled
    #[arg(long, value_enum, default_value_t = ModeArg::Parallel)]
    pub mode: ModeArg,

    /// Concurrent stages in limited-parallel mode
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Shell used to run each command
    #[arg(long, default_value = "sh")]
    pub shell: String,

    /// Working directory for commands
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Also append command output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Output lines kept per stage for the summary
    #[arg(long, default_value_t = 20)]
    pub tail_lines: usize,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.mode {
            ModeArg::Sequential => SchedulingStrategy::Sequential,
            ModeArg::Parallel => SchedulingStrategy::Parallel,
            ModeArg::LimitedParallel => SchedulingStrategy::LimitedParallel(self.max_parallel),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            strategy: self.scheduling_strategy(),
            executor: ExecutorConfig {
                tail_lines: self.tail_lines,
                ..ExecutorConfig::default()
            },
        }
    }
}

/// Validate a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the execution plan for a trigger context
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub context: ContextArgs,
}

/// List pipelines in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution by ID
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Scheduling mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Sequential,
    Parallel,
    #[clap(name = "limited-parallel")]
    LimitedParallel,
}

/// Parse NAME or NAME=bool
pub fn parse_condition(s: &str) -> Result<(String, bool), String> {
    let (name, value) = match s.split_once('=') {
        Some((name, value)) => {
            let value = match value.trim() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => return Err(format!("Invalid condition value `{}` (expected true or false)", other)),
            };
            (name.trim(), value)
        }
        None => (s.trim(), true),
    };

    if name.is_empty() {
        return Err(format!("Invalid condition: {}", s));
    }
    Ok((name.to_string(), value))
}
