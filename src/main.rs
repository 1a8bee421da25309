use anyhow::{Context, Result};
use chrono::Utc;
use stepwise::cli::commands::{ClearCommand, HistoryCommand, RunCommand, StatusCommand, ValidateCommand};
use stepwise::cli::output::*;
use stepwise::cli::{Cli, Command};
use stepwise::core::config::WorkflowConfig;
use stepwise::execution::{EngineError, ExecutionEngine, ExecutionEvent};
use stepwise::generator::CommandGenerator;
use stepwise::persistence::{
    create_failure_summary, create_summary, CheckpointStore, ExecutionSummary, FileCheckpointStore,
    InMemoryPersistence, PersistenceBackend,
};
use stepwise::ExecutionStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins when set
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::Status(cmd) => show_status(cmd).await?,
        Command::Clear(cmd) => clear_checkpoint(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

async fn run_workflow(cmd: &RunCommand) -> Result<()> {
    // Load workflow config
    let mut config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow config")?;
    if let Some(mode) = cmd.mode {
        config.mode = mode.into();
    }

    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    let mut pipeline = config.to_pipeline()?;

    // Apply variable overrides
    for (key, value) in &cmd.variable {
        pipeline.variables.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let history = open_history(cmd.no_history).await?;

    let project = std::path::Path::new(&cmd.project);
    let checkpoints = Arc::new(FileCheckpointStore::for_project(project));
    let generator = CommandGenerator::new(config.generator.clone());

    let engine = ExecutionEngine::new(generator, checkpoints)
        .with_fallback(Arc::new(config.fallbacks()))
        .with_retry_policy(config.retry_policy().with_retry_after(cmd.honor_retry_after))
        .with_default_timeout(config.step_defaults().timeout_secs)
        .with_project_path(cmd.project.clone());

    // Stop at the next step boundary on Ctrl-C; the checkpoint stays in place
    let cancelled = engine.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancelled.store(true, Ordering::SeqCst);
        }
    });

    // Set up event handler for console output
    let progress = create_progress_bar(pipeline.len());
    let bar = progress.clone();
    engine
        .add_event_handler(move |event: ExecutionEvent| {
            bar.println(format_execution_event(&event));
            if advances_progress(&event) {
                bar.inc(1);
            }
            if let ExecutionEvent::StepStarted { step_id, .. } = &event {
                bar.set_message(step_id.clone());
            }
        })
        .await;

    // Execute workflow
    println!();
    let started_at = Utc::now();
    let result = engine.execute(&pipeline, cmd.run_mode()).await;
    progress.finish_and_clear();

    let summary: ExecutionSummary = match &result {
        Ok(report) => create_summary(report),
        Err(e) => {
            let status = match e {
                EngineError::Cancelled { .. } => ExecutionStatus::Cancelled,
                _ => ExecutionStatus::Failed,
            };
            match e.resumable_state() {
                Some(state) => create_failure_summary(&pipeline.name, state, status, pipeline.len(), started_at),
                None => ExecutionSummary {
                    execution_id: uuid::Uuid::new_v4(),
                    pipeline_name: pipeline.name.clone(),
                    status,
                    started_at,
                    completed_at: Some(Utc::now()),
                    completed_steps: 0,
                    total_steps: pipeline.len(),
                    fallbacks_used: 0,
                    failed_step: None,
                },
            }
        }
    };

    // Save to history
    if !cmd.no_history {
        match history.save_execution(&summary).await {
            Ok(()) => println!(
                "\n{} Execution saved to history (ID: {})",
                INFO,
                style(summary.execution_id.to_string().chars().take(8).collect::<String>()).dim()
            ),
            Err(e) => warn!("Failed to save execution history: {:#}", e),
        }
    }

    // Print final status
    match result {
        Ok(report) => {
            println!("\n{}", format_report(&report, 5));
            if let Ok(duration) = report.completed_at.signed_duration_since(report.started_at).to_std() {
                println!("  Duration: {}", style(format_duration(duration)).dim());
            }
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&pipeline.name).bold(),
                style("did not finish").red()
            );
            error!("{}", e);
            if let Some(state) = e.resumable_state() {
                println!("{}", format_checkpoint(state));
                println!(
                    "\n{} Run again to resume from the checkpoint, or pass {} to start over",
                    INFO,
                    style("--regenerate").cyan()
                );
            }
            std::process::exit(1);
        }
    }
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let result = WorkflowConfig::from_file(&cmd.file).and_then(|config| {
        let pipeline = config.to_pipeline()?;
        Ok((config, pipeline))
    });

    match result {
        Ok((config, pipeline)) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!(
                "  Variables: {}",
                style(config.variables_as_string_map().len()).cyan()
            );
            println!(
                "  Order: {}",
                style(pipeline.execution_order().join(" -> ")).dim()
            );

            if cmd.json {
                let data = serde_json::json!({
                    "name": config.name,
                    "mode": config.mode,
                    "execution_order": pipeline.execution_order(),
                });
                println!("\n{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_status(cmd: &StatusCommand) -> Result<()> {
    let store = FileCheckpointStore::for_project(&cmd.project);

    match store.load().await? {
        Some(state) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("{} Checkpoint at {}", INFO, style(store.path().display()).dim());
                println!("{}", format_checkpoint(&state));
            }
        }
        None => println!("{} No checkpoint in {}", INFO, style(&cmd.project).dim()),
    }

    Ok(())
}

async fn clear_checkpoint(cmd: &ClearCommand) -> Result<()> {
    let store = FileCheckpointStore::for_project(&cmd.project);
    store.clear().await?;
    println!("{} Checkpoint cleared for {}", CHECK, style(&cmd.project).dim());
    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history(false).await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.verbose)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    // List executions for one workflow or all
    let mut executions = if let Some(pipeline_name) = &cmd.pipeline {
        store.list_executions(pipeline_name).await?
    } else {
        let mut all_execs = Vec::new();
        for pipeline in store.list_pipelines().await? {
            all_execs.extend(store.list_executions(&pipeline).await?);
        }
        all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_execs
    };
    executions.truncate(cmd.limit);

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
        for summary in &executions {
            println!("  {}", format_execution_summary(summary));
        }
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Workflow: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps
    );
    println!("  Fallbacks used: {}", summary.fallbacks_used);
    if let Some(step) = &summary.failed_step {
        println!("  Failed step: {}", style(step).red());
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_history(ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }
    let store = stepwise::persistence::SqliteExecutionStore::with_default_path()
        .await
        .context("Failed to open execution history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history(_ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(InMemoryPersistence::new()))
}
