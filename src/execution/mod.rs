//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;
pub mod sink;

pub use engine::{EngineConfig, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{precheck, ExecutorConfig, StageExecutor, CANCELLED_REASON};
pub use runner::{CommandRunner, CommandSpec, ShellRunner};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
pub use sink::{NullSink, OutputCapture, OutputSink, TeeSink, WriterSink};
