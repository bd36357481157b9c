//! CLI output formatting

use crate::{
    core::{Eligibility, OverallStatus, Pipeline, PipelineReport, StageOutcome, StageStatus, TriggerContext},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

const MIN_TABLE_WIDTH: usize = 60;

/// Create a progress bar counting finished stages
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(bar_style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a stage outcome's status for display
pub fn format_stage_status(outcome: &StageOutcome) -> String {
    match outcome.status {
        StageStatus::Passed => style("PASSED").green().to_string(),
        StageStatus::Failed if outcome.is_soft_failure() => style("SOFT FAIL").yellow().to_string(),
        StageStatus::Failed => style("FAILED").red().to_string(),
        StageStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format the overall verdict for display
pub fn format_overall_status(status: OverallStatus, cancelled: bool) -> String {
    match (status, cancelled) {
        (_, true) => style("CANCELLED").yellow().to_string(),
        (OverallStatus::Success, false) => style("SUCCESS").green().to_string(),
        (OverallStatus::Failure, false) => style("FAILURE").red().to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_stages,
        } => format!(
            "{}Starting pipeline {} with {} stages ({})",
            ROCKET,
            style(pipeline_name).bold(),
            total_stages,
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { index, label } => {
            format!("{}#{} {}", SPINNER, index + 1, style(label).cyan())
        }
        ExecutionEvent::StageSkipped { index, label, reason } => format!(
            "{}#{} {} skipped: {}",
            SKIP,
            index + 1,
            style(label).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StageFinished { outcome } => {
            let icon = match outcome.status {
                StageStatus::Passed => CHECK,
                StageStatus::Failed if outcome.is_soft_failure() => WARN,
                _ => CROSS,
            };
            let mut line = format!("{}{} {}", icon, style(outcome.display_name()).bold(), format_stage_status(outcome));
            if let Some(error) = &outcome.error {
                line.push_str(&format!(": {}", style(error).dim()));
            }
            if let Some(duration) = outcome.duration() {
                line.push_str(&format!(" ({})", format_duration(duration)));
            }
            line
        }
        ExecutionEvent::PipelineHalted { index, label } => format!(
            "{}Halting after #{} {} failed",
            WARN,
            index + 1,
            style(label).red()
        ),
        ExecutionEvent::PipelineCancelled { .. } => {
            format!("{}Pipeline {}", WARN, style("cancelled").yellow())
        }
        ExecutionEvent::PipelineCompleted { execution_id, status } => {
            let status_str = match status {
                OverallStatus::Success => format!("completed {}", style("successfully").green()),
                OverallStatus::Failure => style("failed").red().to_string(),
            };
            format!(
                "{}Pipeline ({}) {}",
                INFO,
                style(&execution_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Terminal width, clamped to something a table fits in
fn table_width() -> usize {
    term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80)
        .max(MIN_TABLE_WIDTH)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(width.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Per-stage summary table plus the overall verdict
///
/// `CMD#` is the 0-based index of the failing command, as in the JSON report.
pub fn format_summary_table(report: &PipelineReport) -> String {
    let width = table_width();
    // status, exit, cmd, duration columns take a fixed share
    let label_width = width.saturating_sub(46).max(12);
    let mut out = String::new();

    out.push_str(&format!(
        "{:<label_width$}  {:<10}  {:>5}  {:>4}  {:>9}\n",
        "STAGE",
        "STATUS",
        "EXIT",
        "CMD#",
        "DURATION",
        label_width = label_width
    ));
    out.push_str(&"─".repeat(label_width + 40));
    out.push('\n');

    for outcome in &report.result.outcomes {
        let status = match outcome.status {
            StageStatus::Failed if outcome.is_soft_failure() => "SOFT FAIL",
            StageStatus::Failed => "FAILED",
            StageStatus::Passed => "PASSED",
            StageStatus::Skipped => "SKIPPED",
        };
        let exit = match outcome.status {
            StageStatus::Skipped => "-".to_string(),
            _ => outcome.exit_code.to_string(),
        };
        let command = outcome
            .command_index_failed
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string());
        let duration = outcome
            .duration()
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());

        // Pad before styling so escape codes don't break alignment
        let padded = format!("{:<10}", status);
        let styled = match outcome.status {
            StageStatus::Passed => style(padded).green(),
            StageStatus::Failed if outcome.is_soft_failure() => style(padded).yellow(),
            StageStatus::Failed => style(padded).red(),
            StageStatus::Skipped => style(padded).dim(),
        };

        out.push_str(&format!(
            "{:<label_width$}  {}  {:>5}  {:>4}  {:>9}\n",
            truncate(&outcome.display_name(), label_width),
            styled,
            exit,
            command,
            duration,
            label_width = label_width
        ));

        if let Some(reason) = &outcome.skip_reason {
            out.push_str(&format!("    {}\n", style(truncate(reason, width - 4)).dim()));
        }
        for failure in &outcome.cleanup_failures {
            out.push_str(&format!(
                "    {}cleanup `{}` failed (exit {})\n",
                WARN,
                truncate(&failure.command, label_width),
                failure.exit_code
            ));
        }
    }

    let result = &report.result;
    out.push_str(&format!(
        "\n{} {} passed, {} failed, {} soft-failed, {} skipped in {}\n",
        format_overall_status(report.overall_status(), report.cancelled),
        result.count(StageStatus::Passed),
        result.hard_failures().len(),
        result.soft_failures().len(),
        result.count(StageStatus::Skipped),
        format_duration(report.duration())
    ));
    out
}

/// Show the last output lines of each hard-failed stage
pub fn format_failure_tails(report: &PipelineReport, max_lines: usize) -> String {
    let mut out = String::new();
    for outcome in report.result.hard_failures() {
        if outcome.output_tail.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{} {}\n", CROSS, style(outcome.display_name()).bold()));
        out.push_str(&format_output(&outcome.output_tail, max_lines));
        out.push('\n');
    }
    out
}

/// Which stages would run under `context`, and why the rest would not
pub fn format_plan(pipeline: &Pipeline, context: &TriggerContext) -> String {
    let mut out = String::new();
    for (stage, eligibility) in pipeline.plan(context) {
        match &eligibility {
            Eligibility::Eligible => {
                let commands = stage.runnable_commands();
                let mut flags = Vec::new();
                if stage.soft_fail.is_enabled() {
                    flags.push("soft fail".to_string());
                }
                if !stage.cleanup.is_empty() {
                    flags.push(format!("{} cleanup", stage.cleanup.len()));
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                out.push_str(&format!(
                    "{}{} ({} commands){}\n",
                    CHECK,
                    style(stage.display_name()).bold(),
                    commands,
                    style(flags).dim()
                ));
            }
            Eligibility::Ineligible { .. } => {
                out.push_str(&format!(
                    "{}{} {}\n",
                    SKIP,
                    style(stage.display_name()).dim(),
                    style(eligibility.skip_reason().unwrap_or_default()).dim()
                ));
            }
        }
    }
    out
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match (summary.status, summary.cancelled) {
        (_, true) => WARN,
        (OverallStatus::Success, false) => CHECK,
        (OverallStatus::Failure, false) => CROSS,
    };

    format!(
        "{}{} - {} - {} - {} passed, {} failed, {} soft, {} skipped - {}",
        status_icon,
        style(&summary.execution_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_overall_status(summary.status, summary.cancelled),
        summary.passed,
        summary.failed,
        summary.soft_failed,
        summary.skipped,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

/// Format output lines, keeping only the last `max_lines`
pub fn format_output(lines: &[String], max_lines: usize) -> String {
    if lines.len() <= max_lines {
        return lines.join("\n");
    }

    let hidden = lines.len() - max_lines;
    format!(
        "{}... ({} earlier lines)\n{}",
        style("[truncated]").dim(),
        hidden,
        lines[hidden..].join("\n")
    )
}
