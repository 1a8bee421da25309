//! Execution state models

use crate::core::failure::{FailureKind, FailureRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Confidence attached to a result produced by the generator
pub const GENERATED_CONFIDENCE: f64 = 1.0;

/// Confidence attached to a result produced by a deterministic fallback
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every step reached a terminal state without a required failure
    Completed,
    /// A required step failed; the checkpoint is kept for resume
    Failed,
    /// The run was stopped at a checkpoint boundary
    Cancelled,
}

/// Where a completed step's result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultSource {
    /// Produced by the generator during this run
    Generated,
    /// Produced by the fallback strategy during this run
    Fallback,
    /// Reused from a loaded checkpoint
    Cached,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been considered yet
    Pending,
    /// Generator call in flight
    Running {
        started_at: DateTime<Utc>,
        attempt: usize,
    },
    /// Step has a result
    Completed {
        source: ResultSource,
        attempts: usize,
        completed_at: DateTime<Utc>,
    },
    /// Step was bypassed and has no result
    Skipped {
        reason: String,
    },
    /// Attempt failed, another one is scheduled
    FailedRetryable {
        attempt: usize,
        failure: FailureRecord,
    },
    /// Step failed for good (retries and fallback exhausted)
    FailedTerminal {
        failure: FailureRecord,
        attempts: usize,
        failed_at: DateTime<Utc>,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Skipped { .. } | StepState::FailedTerminal { .. }
        )
    }
}

/// Durable checkpoint record for one run lineage
///
/// Serialized with camelCase field names; this is the on-disk checkpoint format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// Identifies the run across resumes
    pub run_id: Uuid,

    /// Step most recently attempted
    #[serde(default)]
    pub current_step: Option<String>,

    /// Steps with a stored result, in completion order
    #[serde(default)]
    pub completed_steps: Vec<String>,

    /// Required step that aborted the last run
    #[serde(default)]
    pub failed_step: Option<String>,

    #[serde(default)]
    pub failure_kind: Option<FailureKind>,

    #[serde(default)]
    pub failure_reason: Option<String>,

    /// Results keyed by step id
    #[serde(default)]
    pub partial_results: BTreeMap<String, Value>,

    /// Completed steps whose result came from a fallback
    #[serde(default)]
    pub fallbacks_used: Vec<String>,

    /// Last mutation time
    pub timestamp: DateTime<Utc>,

    pub project_path: String,
}

impl PipelineState {
    /// Create an empty state for a project
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            current_step: None,
            completed_steps: Vec::new(),
            failed_step: None,
            failure_kind: None,
            failure_reason: None,
            partial_results: BTreeMap::new(),
            fallbacks_used: Vec::new(),
            timestamp: Utc::now(),
            project_path: project_path.into(),
        }
    }

    /// Whether the step has a stored, reusable result
    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps.iter().any(|id| id == step_id)
            && self.partial_results.contains_key(step_id)
    }

    /// Stored result of a step
    pub fn result(&self, step_id: &str) -> Option<&Value> {
        self.partial_results.get(step_id)
    }

    /// Whether the stored result of a step came from a fallback
    pub fn used_fallback(&self, step_id: &str) -> bool {
        self.fallbacks_used.iter().any(|id| id == step_id)
    }

    /// Confidence of a stored result
    pub fn confidence(&self, step_id: &str) -> f64 {
        if self.used_fallback(step_id) {
            FALLBACK_CONFIDENCE
        } else {
            GENERATED_CONFIDENCE
        }
    }

    /// Record the step as the one currently being attempted
    pub fn begin_step(&mut self, step_id: &str) {
        self.current_step = Some(step_id.to_string());
        self.timestamp = Utc::now();
    }

    /// Record a successful step
    pub fn record_success(&mut self, step_id: &str, result: Value, fallback_used: bool) {
        if !self.completed_steps.iter().any(|id| id == step_id) {
            self.completed_steps.push(step_id.to_string());
        }
        self.partial_results.insert(step_id.to_string(), result);

        self.fallbacks_used.retain(|id| id != step_id);
        if fallback_used {
            self.fallbacks_used.push(step_id.to_string());
        }

        if self.failed_step.as_deref() == Some(step_id) {
            self.clear_failure();
        }
        self.current_step = Some(step_id.to_string());
        self.timestamp = Utc::now();
    }

    /// Record the required step that aborted the run
    pub fn record_failure(&mut self, step_id: &str, kind: FailureKind, reason: impl Into<String>) {
        self.completed_steps.retain(|id| id != step_id);
        self.failed_step = Some(step_id.to_string());
        self.failure_kind = Some(kind);
        self.failure_reason = Some(reason.into());
        self.current_step = Some(step_id.to_string());
        self.timestamp = Utc::now();
    }

    /// Drop the failure marker left by a previous aborted run
    pub fn clear_failure(&mut self) {
        self.failed_step = None;
        self.failure_kind = None;
        self.failure_reason = None;
    }
}
