//! Error types for loading pipelines and running commands

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading a pipeline document.
///
/// All of these are fatal: they are reported before any stage is scheduled.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read pipeline file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pipeline YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pipeline document must be a list of stages or a mapping with a `steps` list")]
    UnsupportedShape,

    #[error("Stage #{position} is missing a label")]
    MissingLabel { position: usize },

    #[error("Stage #{position} ({label}) has no commands")]
    EmptyCommands { position: usize, label: String },

    #[error("Stage #{position} ({label}) has a blank command at position {command_index}")]
    BlankCommand {
        position: usize,
        label: String,
        command_index: usize,
    },

    #[error("Stage #{position} ({label}) has a blank condition name")]
    BlankCondition { position: usize, label: String },

    #[error("Stage #{position} ({label}) reuses key '{key}'")]
    DuplicateKey {
        position: usize,
        label: String,
        key: String,
    },

    #[error("Stage #{position} ({label}) has a timeout of zero minutes")]
    ZeroTimeout { position: usize, label: String },

    #[error("Stage #{position} ({label}) sets both `command` and `commands`")]
    ConflictingCommands { position: usize, label: String },

    #[error("Stage #{position} ({label}) has an invalid soft_fail exit status '{value}'")]
    InvalidSoftFail {
        position: usize,
        label: String,
        value: String,
    },

    #[error("Environment variable '{name}' must be a scalar value")]
    InvalidEnvValue { name: String },
}

/// Errors from running a single shell command.
///
/// These never escape the stage runner: they are folded into the stage outcome.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("`{command}` was terminated by a signal")]
    Signaled { command: String },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

/// Exit code recorded when a command cannot be spawned
pub const EXIT_SPAWN_FAILED: i32 = 127;
/// Exit code recorded when a stage exceeds its timeout
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code recorded when a stage is cancelled
pub const EXIT_CANCELLED: i32 = 130;
/// Exit code recorded when a process dies from a signal
pub const EXIT_SIGNALED: i32 = -1;

impl CommandError {
    /// The exit code to record for this error in a stage outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Spawn { .. } => EXIT_SPAWN_FAILED,
            CommandError::NonZeroExit { code, .. } => *code,
            CommandError::Signaled { .. } => EXIT_SIGNALED,
            CommandError::Timeout { .. } => EXIT_TIMEOUT,
            CommandError::Cancelled { .. } => EXIT_CANCELLED,
        }
    }

    /// Whether the error came from a pipeline cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled { .. })
    }
}
