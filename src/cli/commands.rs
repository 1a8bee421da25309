//! CLI command definitions

use crate::core::config::WorkflowMode;
use crate::execution::RunMode;
use clap::Args;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Project directory holding the checkpoint
    #[arg(short, long, default_value = ".")]
    pub project: String,

    /// Reuse completed steps from the checkpoint (default)
    #[arg(long)]
    pub resume: bool,

    /// Delete the checkpoint and run every step again
    #[arg(long, conflicts_with = "resume")]
    pub regenerate: bool,

    /// Variable overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub variable: Vec<(String, String)>,

    /// Override the workflow's ordering mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Wait at least as long as a rate-limit response asks before retrying
    #[arg(long)]
    pub honor_retry_after: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,
}

impl RunCommand {
    pub fn run_mode(&self) -> RunMode {
        if self.regenerate {
            RunMode::Regenerate
        } else {
            RunMode::Resume
        }
    }
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Print the resolved execution order as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show the checkpoint of a project
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Project directory holding the checkpoint
    #[arg(short, long, default_value = ".")]
    pub project: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Delete the checkpoint of a project
#[derive(Debug, Args, Clone)]
pub struct ClearCommand {
    /// Project directory holding the checkpoint
    #[arg(short, long, default_value = ".")]
    pub project: String,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific execution ID
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Ordering mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Dag,
    Linear,
}

impl From<ModeArg> for WorkflowMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Dag => WorkflowMode::Dag,
            ModeArg::Linear => WorkflowMode::Linear,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
