//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ClearCommand, HistoryCommand, RunCommand, StatusCommand, ValidateCommand};
use std::ffi::OsString;

/// Resumable workflow runner for AI generation pipelines
#[derive(Debug, Parser, Clone)]
#[command(name = "stepwise")]
#[command(version)]
#[command(about = "Run checkpointed, resumable generation workflows", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow, resuming from its checkpoint by default
    Run(RunCommand),

    /// Validate a workflow configuration
    Validate(ValidateCommand),

    /// Show the checkpoint left by an interrupted or failed run
    Status(StatusCommand),

    /// Delete the checkpoint so the next run starts clean
    Clear(ClearCommand),

    /// Show execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
