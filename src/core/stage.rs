//! Stage domain model

use crate::core::{
    config::{ExitStatusMatch, SoftFailConfig, StageConfig},
    error::ParseError,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

/// A single stage in a pipeline
///
/// Stages are immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// Position in the document (0-based)
    pub index: usize,

    /// Display name; not necessarily unique
    pub label: String,

    /// Optional unique identifier
    pub key: Option<String>,

    /// Trigger conditions, all of which must hold
    pub conditions: Vec<String>,

    /// Command sequence, in execution order
    pub commands: Vec<StageCommand>,

    /// Cleanup commands registered when the stage starts
    pub cleanup: Vec<String>,

    /// Soft-fail policy
    pub soft_fail: SoftFail,

    /// Stage environment, without the pipeline environment
    pub env: BTreeMap<String, String>,

    /// Timeout for the whole command sequence
    pub timeout: Option<Duration>,
}

/// One entry of a stage's command sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCommand {
    /// Run a shell command
    Run(String),
    /// Register a deferred cleanup (`trap '<cmd>' EXIT`)
    ///
    /// Holds the full cleanup script, including any shell functions the
    /// stage defined before the trap.
    RegisterCleanup(String),
    /// Run a command, then register a cleanup (`<cmd>; trap <cleanup> EXIT`)
    ///
    /// With `always` the cleanup is registered even when the command fails,
    /// as `;` would in the shell. Otherwise only on success, as `&&` would.
    RunThenRegister {
        command: String,
        cleanup: String,
        always: bool,
    },
}

impl StageCommand {
    /// The command as written in the document
    pub fn display(&self) -> String {
        match self {
            StageCommand::Run(command) => command.clone(),
            StageCommand::RegisterCleanup(command) => format!("trap '{}' EXIT", command),
            StageCommand::RunThenRegister { command, cleanup, always } => {
                let separator = if *always { ";" } else { " &&" };
                format!("{}{} trap '{}' EXIT", command, separator, cleanup)
            }
        }
    }
}

/// Which failures of a stage are advisory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoftFail {
    /// Every failure counts
    #[default]
    Never,
    /// No failure counts
    Always,
    /// Failures with one of these exit codes are advisory
    ExitStatuses(Vec<i32>),
}

impl SoftFail {
    /// Whether a failure with this exit code is advisory
    pub fn covers(&self, exit_code: i32) -> bool {
        match self {
            SoftFail::Never => false,
            SoftFail::Always => true,
            SoftFail::ExitStatuses(codes) => codes.contains(&exit_code),
        }
    }

    /// Whether any failure can be advisory
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SoftFail::Never)
    }
}

fn trap_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*trap\s+(?:'(?P<single>[^']*)'|"(?P<double>[^"]*)"|(?P<bare>[^\s'"]+))\s+(?P<signals>[A-Za-z0-9]+(?:\s+[A-Za-z0-9]+)*)\s*;?\s*$"#)
            .expect("trap pattern is valid")
    })
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r";|&&").expect("separator pattern is valid"))
}

fn function_definition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^\s*[A-Za-z_][A-Za-z0-9_]*\s*\(\s*\)\s*\{.*\}\s*;?\s*$")
            .expect("function definition pattern is valid")
    })
}

/// Recognize `trap <cmd> EXIT` and return the cleanup command
///
/// Returns `None` for anything else, including traps that only reset the handler.
pub fn parse_trap(command: &str) -> Option<String> {
    let captures = trap_pattern().captures(command)?;

    let on_exit = captures["signals"]
        .split_whitespace()
        .any(|signal| signal == "EXIT" || signal == "0");
    if !on_exit {
        return None;
    }

    let body = captures
        .name("single")
        .or_else(|| captures.name("double"))
        .or_else(|| captures.name("bare"))
        .map(|m| m.as_str().trim())?;

    if body.is_empty() || body == "-" {
        return None;
    }
    Some(body.to_string())
}

/// A trap that ends a compound command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingTrap<'a> {
    /// Everything before the trap, without the separator
    pub prefix: &'a str,
    /// Cleanup command registered by the trap
    pub cleanup: String,
    /// Whether the separator was `;` rather than `&&`
    pub always: bool,
}

/// Recognize `<prefix>; trap <cmd> EXIT` (or `&&`) and split it
///
/// The trap must be the last statement on the line.
pub fn parse_trailing_trap(command: &str) -> Option<TrailingTrap<'_>> {
    let separators: Vec<_> = separator_pattern().find_iter(command).collect();

    // Scan from the right so a quoted trap body may itself contain `;`
    separators.into_iter().rev().find_map(|separator| {
        let prefix = command[..separator.start()].trim_end();
        if prefix.is_empty() {
            return None;
        }
        let cleanup = parse_trap(&command[separator.end()..])?;
        Some(TrailingTrap {
            prefix,
            cleanup,
            always: separator.as_str() == ";",
        })
    })
}

/// Whether a command only defines shell functions (`name() { ... }`)
pub fn is_function_definition(command: &str) -> bool {
    function_definition_pattern().is_match(command)
}

/// Prepend earlier function definitions so the cleanup can call them
fn cleanup_script(definitions: &[String], body: &str) -> String {
    if definitions.is_empty() {
        return body.to_string();
    }
    let mut script = definitions.join("\n");
    script.push('\n');
    script.push_str(body);
    script
}

/// Classify one raw command, tracking function definitions seen so far
fn stage_command(raw: &str, definitions: &mut Vec<String>) -> StageCommand {
    if let Some(body) = parse_trap(raw) {
        return StageCommand::RegisterCleanup(cleanup_script(definitions, &body));
    }

    if let Some(trap) = parse_trailing_trap(raw) {
        if is_function_definition(trap.prefix) {
            definitions.push(trap.prefix.to_string());
            return StageCommand::RegisterCleanup(cleanup_script(definitions, &trap.cleanup));
        }
        return StageCommand::RunThenRegister {
            command: trap.prefix.to_string(),
            cleanup: cleanup_script(definitions, &trap.cleanup),
            always: trap.always,
        };
    }

    if is_function_definition(raw) {
        definitions.push(raw.trim().to_string());
    }
    StageCommand::Run(raw.to_string())
}

impl Stage {
    /// Create a stage from a stage config
    pub fn from_config(index: usize, config: &StageConfig) -> Result<Self, ParseError> {
        let position = index + 1;

        let label = match config.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => return Err(ParseError::MissingLabel { position }),
        };

        let raw_commands: Vec<String> = match (&config.command, config.commands.is_empty()) {
            (Some(_), false) => {
                return Err(ParseError::ConflictingCommands { position, label });
            }
            (Some(command), true) => vec![command.clone()],
            (None, _) => config.commands.clone(),
        };

        if raw_commands.is_empty() {
            return Err(ParseError::EmptyCommands { position, label });
        }

        let mut commands = Vec::with_capacity(raw_commands.len());
        let mut definitions = Vec::new();
        for (command_index, raw) in raw_commands.iter().enumerate() {
            if raw.trim().is_empty() {
                return Err(ParseError::BlankCommand {
                    position,
                    label,
                    command_index,
                });
            }
            commands.push(stage_command(raw, &mut definitions));
        }

        let mut conditions: Vec<String> = Vec::with_capacity(config.conditions.len());
        for condition in &config.conditions {
            let condition = condition.trim();
            if condition.is_empty() {
                return Err(ParseError::BlankCondition { position, label });
            }
            if !conditions.iter().any(|c| c == condition) {
                conditions.push(condition.to_string());
            }
        }

        let soft_fail = match &config.soft_fail {
            SoftFailConfig::Flag(false) => SoftFail::Never,
            SoftFailConfig::Flag(true) => SoftFail::Always,
            SoftFailConfig::Rules(rules) => {
                let mut codes = Vec::new();
                let mut wildcard = false;
                for rule in rules {
                    match &rule.exit_status {
                        ExitStatusMatch::Code(code) => codes.push(*code),
                        ExitStatusMatch::Pattern(p) if p.trim() == "*" => wildcard = true,
                        ExitStatusMatch::Pattern(p) => match p.trim().parse::<i32>() {
                            Ok(code) => codes.push(code),
                            Err(_) => {
                                return Err(ParseError::InvalidSoftFail {
                                    position,
                                    label,
                                    value: p.clone(),
                                });
                            }
                        },
                    }
                }
                if wildcard {
                    SoftFail::Always
                } else if codes.is_empty() {
                    SoftFail::Never
                } else {
                    SoftFail::ExitStatuses(codes)
                }
            }
        };

        let timeout = match config.timeout_in_minutes {
            Some(0) => return Err(ParseError::ZeroTimeout { position, label }),
            Some(minutes) => Some(Duration::from_secs(minutes * 60)),
            None => None,
        };

        Ok(Stage {
            index,
            label,
            key: config.key.clone(),
            conditions,
            commands,
            cleanup: config.cleanup.iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect(),
            soft_fail,
            env: config.env_as_string_map()?,
            timeout,
        })
    }

    /// Name used in reports; unique even when labels repeat
    pub fn display_name(&self) -> String {
        format!("#{} {}", self.index + 1, self.label)
    }

    /// Number of shell commands that actually spawn a process
    pub fn runnable_commands(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| !matches!(c, StageCommand::RegisterCleanup(_)))
            .count()
    }
}
