//! CLI output formatting

use crate::{
    core::{value_as_text, ExecutionStatus, PipelineState, ResultSource, StepState},
    execution::{ExecutionEvent, RunReport},
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static RECYCLE: Emoji<'_, '_> = Emoji("♻️  ", "= ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Whether an event moves the progress bar
pub fn advances_progress(event: &ExecutionEvent) -> bool {
    matches!(
        event,
        ExecutionEvent::StepCompleted { .. }
            | ExecutionEvent::StepCached { .. }
            | ExecutionEvent::StepSkipped { .. }
            | ExecutionEvent::StepFailed { required: false, .. }
    )
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { attempt, .. } => {
            style(format!("RUNNING (attempt {})", attempt)).yellow().to_string()
        }
        StepState::Completed { source, .. } => match source {
            ResultSource::Generated => style("COMPLETED").green().to_string(),
            ResultSource::Fallback => style("FALLBACK").yellow().to_string(),
            ResultSource::Cached => style("CACHED").green().dim().to_string(),
        },
        StepState::FailedRetryable { attempt, .. } => {
            style(format!("RETRYING (after attempt {})", attempt)).yellow().to_string()
        }
        StepState::FailedTerminal { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { reason } => style(format!("SKIPPED ({})", reason)).dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan()
    );
    if summary.fallbacks_used > 0 {
        line.push_str(&format!(
            " - {}",
            style(format!("{} fallback(s)", summary.fallbacks_used)).yellow()
        ));
    }
    if let Some(step) = &summary.failed_step {
        line.push_str(&format!(" - failed at {}", style(step).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            total_steps,
            resumed_steps,
        } => {
            let mut line = format!(
                "{} Starting {} ({}) with {} steps",
                ROCKET,
                style(pipeline_name).bold(),
                style(short_id(run_id)).dim(),
                total_steps
            );
            if *resumed_steps > 0 {
                line.push_str(&format!(
                    ", resuming with {} completed",
                    style(resumed_steps).cyan()
                ));
            }
            line
        }
        ExecutionEvent::StepStarted {
            step_id,
            attempt,
            max_attempts,
        } => {
            if *attempt > 1 {
                format!(
                    "{} {} (attempt {}/{})",
                    SPINNER,
                    style(step_id).cyan(),
                    style(attempt).dim(),
                    style(max_attempts).dim()
                )
            } else {
                format!("{} {}", SPINNER, style(step_id).cyan())
            }
        }
        ExecutionEvent::StepRetrying {
            step_id,
            attempt,
            delay_ms,
            failure,
        } => format!(
            "{} {} attempt {} failed ({}), retrying in {}ms",
            WARN,
            style(step_id).yellow(),
            attempt,
            failure.kind,
            delay_ms
        ),
        ExecutionEvent::StepCached { step_id } => {
            format!("{} {} (from checkpoint)", RECYCLE, style(step_id).green())
        }
        ExecutionEvent::StepCompleted {
            step_id, source, ..
        } => match source {
            ResultSource::Fallback => format!(
                "{} {} {}",
                CHECK,
                style(step_id).green(),
                style("(fallback)").yellow()
            ),
            _ => format!("{} {}", CHECK, style(step_id).green()),
        },
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} ({})", SKIP, style(step_id).dim(), reason)
        }
        ExecutionEvent::StepFallback { step_id, failure } => format!(
            "{} {} gave up after {}, using fallback",
            WARN,
            style(step_id).yellow(),
            failure
        ),
        ExecutionEvent::StepFailed {
            step_id,
            failure,
            message,
            required,
        } => {
            let mut line = format!(
                "{} {}: {} {}",
                CROSS,
                style(step_id).red(),
                failure,
                style(message).dim()
            );
            if !required {
                line.push_str(&format!(" {}", style("(optional, continuing)").dim()));
            }
            line
        }
        ExecutionEvent::CheckpointSaved {
            step_id,
            completed_steps,
        } => format!(
            "{} checkpoint saved after {} ({} completed)",
            INFO,
            style(step_id).dim(),
            completed_steps
        ),
        ExecutionEvent::RunFinished { run_id, status } => format!(
            "{} Run ({}) {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format the final report of a run
pub fn format_report(report: &RunReport, max_lines: usize) -> String {
    let mut out = Vec::new();

    for outcome in &report.outcomes {
        let mut line = format!("  {} {}", style(&outcome.step_id).bold(), format_step_state(&outcome.state));
        if let Some(confidence) = report.confidence.get(&outcome.step_id) {
            line.push_str(&format!(" {}", style(format!("confidence {:.1}", confidence)).dim()));
        }
        out.push(line);

        if let Some(value) = report.output(&outcome.step_id) {
            for result_line in format_output(&value_as_text(value), max_lines).lines() {
                out.push(format!("      {}", style(result_line).dim()));
            }
        }
    }

    if !report.is_high_fidelity() {
        out.push(format!(
            "{} Fallback results used for: {}",
            WARN,
            style(report.fallbacks_used.join(", ")).yellow()
        ));
    }

    out.join("\n")
}

/// Format a checkpoint for the status command
pub fn format_checkpoint(state: &PipelineState) -> String {
    let mut out = vec![
        format!("  Run: {}", style(state.run_id).cyan()),
        format!("  Project: {}", style(&state.project_path).dim()),
        format!("  Updated: {}", style(state.timestamp.to_rfc3339()).dim()),
        format!(
            "  Completed steps: {}",
            style(state.completed_steps.join(", ")).green()
        ),
    ];

    if !state.fallbacks_used.is_empty() {
        out.push(format!(
            "  Fallbacks: {}",
            style(state.fallbacks_used.join(", ")).yellow()
        ));
    }

    if let Some(step) = &state.failed_step {
        let kind = state
            .failure_kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        out.push(format!("  Failed step: {} ({})", style(step).red(), kind));
        if let Some(reason) = &state.failure_reason {
            out.push(format!("  Reason: {}", style(reason).dim()));
        }
        if let Some(kind) = state.failure_kind {
            for suggestion in kind.suggestions() {
                out.push(format!("    - {}", suggestion));
            }
        }
    }

    out.join("\n")
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
