//! stagerun - a declarative pipeline runner with conditional stages,
//! soft failures and guaranteed cleanup

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{
    load, load_file, CommandError, OverallStatus, ParseError, Pipeline, PipelineReport, PipelineResult, Stage,
    StageOutcome, StageStatus, TriggerContext,
};
pub use execution::{EngineConfig, ExecutionEngine, ExecutionEvent, SchedulingStrategy, ShellRunner};
