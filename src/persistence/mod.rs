//! Persistence layer - run checkpoints and execution history

pub mod checkpoint;
#[cfg(feature = "sqlite")]
pub mod store;

pub use checkpoint::{CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::PipelineState;
use crate::execution::RunReport;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Run ID (stable across resumes)
    pub execution_id: Uuid,

    /// Workflow name
    pub pipeline_name: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of steps with a result
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of results that came from a fallback
    pub fallbacks_used: usize,

    /// Required step that aborted the run
    pub failed_step: Option<String>,
}

impl ExecutionSummary {
    /// Progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.completed_steps.min(self.total_steps) as f64 / self.total_steps as f64
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all runs of a workflow, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all workflow names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut result: Vec<ExecutionSummary> = execs
            .values()
            .filter(|e| e.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.pipeline_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a completed run
pub fn create_summary(report: &RunReport) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: report.run_id,
        pipeline_name: report.pipeline_name.clone(),
        status: report.status,
        started_at: report.started_at,
        completed_at: Some(report.completed_at),
        completed_steps: report.results.len(),
        total_steps: report.total_steps,
        fallbacks_used: report.fallbacks_used.len(),
        failed_step: None,
    }
}

/// Create a summary from the state a failed or cancelled run left behind
pub fn create_failure_summary(
    pipeline_name: &str,
    state: &PipelineState,
    status: ExecutionStatus,
    total_steps: usize,
    started_at: DateTime<Utc>,
) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: state.run_id,
        pipeline_name: pipeline_name.to_string(),
        status,
        started_at,
        completed_at: Some(Utc::now()),
        completed_steps: state.completed_steps.len(),
        total_steps,
        fallbacks_used: state.fallbacks_used.len(),
        failed_step: state.failed_step.clone(),
    }
}
