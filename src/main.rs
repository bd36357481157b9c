use anyhow::{Context, Result};
use stagerun::cli::commands::{HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand};
use stagerun::cli::interrupt::watch_interrupts;
use stagerun::cli::output::*;
use stagerun::cli::{Cli, Command};
use stagerun::core::config::PipelineConfig;
use stagerun::core::error::EXIT_CANCELLED;
use stagerun::core::{OverallStatus, ParseError, Pipeline};
use stagerun::execution::{
    ExecutionEngine, ExecutionEvent, NullSink, OutputSink, ShellRunner, TeeSink, WriterSink,
};
use stagerun::persistence::{ExecutionSummary, InMemoryPersistence, PersistenceBackend};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for documents that fail to load
const EXIT_PARSE_ERROR: i32 = 2;

/// Output lines shown per failed stage after the summary
const FAILURE_TAIL_LINES: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    // Execute command
    let code = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Plan(cmd) => plan_pipeline(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Load a pipeline, printing a parse error instead of failing
fn load_pipeline(file: &str) -> Result<Pipeline, ParseError> {
    let pipeline = stagerun::load_file(file);
    if let Err(e) = &pipeline {
        println!("{}Failed to load {}:", CROSS, style(file).bold());
        println!("  {}", style(e).red());
    }
    pipeline
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = stagerun::persistence::SqliteExecutionStore::with_default_path()
        .await
        .context("Failed to open execution history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without the sqlite feature; history is not kept between runs");
    Ok(Arc::new(InMemoryPersistence::new()))
}

fn output_sink(cmd: &RunCommand, stream: bool) -> Result<Arc<dyn OutputSink>> {
    let mut sinks: Vec<Arc<dyn OutputSink>> = Vec::new();
    if stream {
        sinks.push(Arc::new(WriterSink::stdout()));
    }
    if let Some(path) = &cmd.log_file {
        let sink = WriterSink::file(path).with_context(|| format!("Failed to open log file {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }

    Ok(match sinks.len() {
        0 => Arc::new(NullSink),
        1 => sinks.remove(0),
        _ => Arc::new(TeeSink::new(sinks)),
    })
}

async fn run_pipeline(cmd: &RunCommand, stream: bool) -> Result<i32> {
    let pipeline = match load_pipeline(&cmd.file) {
        Ok(pipeline) => pipeline,
        Err(_) => return Ok(EXIT_PARSE_ERROR),
    };
    let context = cmd.context.trigger_context()?;

    println!(
        "{}Loaded pipeline: {} ({} stages)",
        INFO,
        style(&pipeline.name).bold(),
        pipeline.len()
    );

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store().await?
    };

    let mut runner = ShellRunner::new().with_shell(&cmd.shell);
    if let Some(dir) = &cmd.workdir {
        runner = runner.with_workdir(dir);
    }
    let mut engine = ExecutionEngine::from_config(runner, output_sink(cmd, stream)?, cmd.engine_config());

    // Streamed output and a progress bar would fight over the terminal
    if stream {
        engine.add_event_handler(|event| println!("{}", format_execution_event(&event)));
    } else {
        let progress = create_progress_bar(pipeline.len());
        engine.add_event_handler(move |event| match &event {
            ExecutionEvent::StageStarted { label, .. } => progress.set_message(label.clone()),
            ExecutionEvent::StageSkipped { .. } | ExecutionEvent::StageFinished { .. } => {
                progress.inc(1);
                progress.println(format_execution_event(&event));
            }
            ExecutionEvent::PipelineHalted { .. } | ExecutionEvent::PipelineCancelled { .. } => {
                progress.println(format_execution_event(&event));
            }
            ExecutionEvent::PipelineCompleted { .. } => progress.finish_and_clear(),
            ExecutionEvent::PipelineStarted { .. } => {}
        });
    }

    // Ctrl-C cancels the run and cleanups still execute; a second one exits
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match watch_interrupts(cancel, tokio::signal::ctrl_c).await {
                Ok(()) => std::process::exit(EXIT_CANCELLED),
                Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });
    }

    println!();
    let report = engine.execute(&pipeline, &context, cancel).await;

    println!("\n{}", format_summary_table(&report));
    print!("{}", format_failure_tails(&report, FAILURE_TAIL_LINES));

    // Save to history
    if !cmd.no_history {
        let summary = ExecutionSummary::from_report(&report);
        match store.save_execution(&summary).await {
            Ok(()) => println!(
                "\n{}Execution saved to history (ID: {})",
                INFO,
                style(&summary.execution_id.to_string()[..8]).dim()
            ),
            Err(e) => error!("Failed to save execution history: {:#}", e),
        }
    }

    // Print final status
    match report.overall_status() {
        OverallStatus::Success => println!(
            "\n{}{} completed {}",
            CHECK,
            style(&pipeline.name).bold(),
            style("successfully").green()
        ),
        OverallStatus::Failure => println!(
            "\n{}{} {}",
            CROSS,
            style(&pipeline.name).bold(),
            format_overall_status(OverallStatus::Failure, report.cancelled)
        ),
    }

    Ok(report.exit_code())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<i32> {
    println!("{}Validating pipeline...", INFO);

    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(e).red());
            return Ok(EXIT_PARSE_ERROR);
        }
    };
    let pipeline = match config.to_pipeline() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(e).red());
            return Ok(EXIT_PARSE_ERROR);
        }
    };

    println!("{}Pipeline configuration is valid!", CHECK);
    println!("  Name: {}", style(&pipeline.name).bold());
    println!("  Stages: {}", style(pipeline.len()).cyan());
    println!("  Env: {}", style(pipeline.env.len()).cyan());
    for stage in &pipeline.stages {
        let conditions = if stage.conditions.is_empty() {
            String::new()
        } else {
            format!(" if {}", stage.conditions.join(" && "))
        };
        println!(
            "    {} ({} commands){}",
            style(stage.display_name()).bold(),
            stage.runnable_commands(),
            style(conditions).dim()
        );
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(0)
}

fn plan_pipeline(cmd: &PlanCommand) -> Result<i32> {
    let pipeline = match load_pipeline(&cmd.file) {
        Ok(pipeline) => pipeline,
        Err(_) => return Ok(EXIT_PARSE_ERROR),
    };
    let context = cmd.context.trigger_context()?;

    println!(
        "{}Plan for {} ({} of {} stages eligible):",
        INFO,
        style(&pipeline.name).bold(),
        pipeline.eligible_stages(&context).len(),
        pipeline.len()
    );
    print!("{}", format_plan(&pipeline, &context));
    Ok(0)
}

async fn list_pipelines(cmd: &ListCommand) -> Result<i32> {
    let store = open_store().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}No pipelines found in history", INFO);
        return Ok(0);
    }

    let mut rows = Vec::new();
    for name in &pipelines {
        let executions = store.list_executions(name).await?;
        let succeeded = executions
            .iter()
            .filter(|e| e.status == OverallStatus::Success)
            .count();
        rows.push((name, executions.len(), succeeded));
    }

    if cmd.json {
        let data: Vec<_> = rows
            .iter()
            .map(|(name, runs, succeeded)| {
                serde_json::json!({
                    "name": name,
                    "execution_count": runs,
                    "succeeded": succeeded,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "pipelines": data }))?);
        return Ok(0);
    }

    println!("{}Pipelines in history:", INFO);
    for (name, runs, succeeded) in rows {
        if cmd.with_counts {
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(name).bold(),
                style(runs).cyan(),
                style(succeeded).green(),
                style(runs - succeeded).red()
            );
        } else {
            println!("  {}", style(name).bold());
        }
    }

    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = open_store().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.details, cmd.json)?,
            None => println!("{}Execution not found", WARN),
        }
        return Ok(0);
    }

    let mut executions = match &cmd.pipeline {
        Some(name) => store.list_executions(name).await?,
        None => {
            let mut all = Vec::new();
            for name in store.list_pipelines().await? {
                all.extend(store.list_executions(&name).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(0);
    }

    if executions.is_empty() {
        println!("{}No executions found", INFO);
        return Ok(0);
    }

    println!("{}Execution history (showing latest {}):", INFO, executions.len());
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(0)
}

fn print_execution_details(summary: &ExecutionSummary, details: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{}Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_overall_status(summary.status, summary.cancelled));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    println!("  Completed: {}", style(summary.completed_at.to_rfc3339()).dim());
    println!("  Duration: {}", style(format_duration(summary.duration())).dim());
    println!(
        "  Stages: {} passed, {} failed, {} soft-failed, {} skipped",
        style(summary.passed).green(),
        style(summary.failed).red(),
        style(summary.soft_failed).yellow(),
        style(summary.skipped).dim()
    );

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
