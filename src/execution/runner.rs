//! Shell command runner - spawns one process per command

use crate::core::error::CommandError;
use crate::execution::sink::OutputCapture;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A command to run on behalf of a stage
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line
    pub command: String,

    /// Extra environment for the process
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, env: BTreeMap<String, String>) -> Self {
        Self {
            command: command.into(),
            env,
        }
    }
}

/// Trait for command execution - allows for different implementations
///
/// `Ok(())` means the command exited with status 0.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        spec: &CommandSpec,
        output: &OutputCapture,
        cancel: &CancellationToken,
    ) -> Result<(), CommandError>;
}

/// Runs commands through a shell (`sh -c <command>` by default)
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Shell executable
    shell: String,

    /// Arguments placed before the command string
    shell_args: Vec<String>,

    /// Working directory for every command
    workdir: Option<PathBuf>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string()],
            workdir: None,
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell, e.g. `bash`
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        output: &OutputCapture,
        cancel: &CancellationToken,
    ) -> Result<(), CommandError> {
        if cancel.is_cancelled() {
            return Err(CommandError::Cancelled {
                command: spec.command.clone(),
            });
        }

        debug!("Spawning `{} {} {}`", self.shell, self.shell_args.join(" "), spec.command);

        let mut command = Command::new(&self.shell);
        command
            .args(&self.shell_args)
            .arg(&spec.command)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            command: spec.command.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Owns the child: dropping this future kills the process
        let completion = async move {
            tokio::join!(pump_lines(stdout, output), pump_lines(stderr, output));
            child.wait().await
        };

        let status = tokio::select! {
            status = completion => status,
            _ = cancel.cancelled() => {
                warn!("Cancelled `{}`", spec.command);
                return Err(CommandError::Cancelled {
                    command: spec.command.clone(),
                });
            }
        };

        let status = status.map_err(|source| CommandError::Spawn {
            command: spec.command.clone(),
            source,
        })?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(CommandError::NonZeroExit {
                command: spec.command.clone(),
                code,
            }),
            None => Err(CommandError::Signaled {
                command: spec.command.clone(),
            }),
        }
    }
}

async fn pump_lines<R: AsyncRead + Unpin>(reader: Option<R>, output: &OutputCapture) {
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => output.push(line).await,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading command output: {}", e);
                break;
            }
        }
    }
}
