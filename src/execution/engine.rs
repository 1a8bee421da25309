//! Main execution engine - orchestrates a checkpointed workflow run

use crate::{
    core::{
        ExecutionStatus, FailureKind, FailureRecord, Pipeline, PipelineContext, PipelineState,
        ResultSource, StepDescriptor, StepState,
    },
    execution::{
        classifier::classify,
        executor::StepExecutor,
        fallback::{FallbackStrategy, NoFallback},
        retry::RetryPolicy,
        scheduler::{ExecutionScheduler, DEPENDENCY_FAILED},
    },
    generator::Generator,
    persistence::checkpoint::{CheckpointError, CheckpointStore},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reason recorded on steps whose skip predicate returned true
pub const SKIP_CONDITION_MET: &str = "skip condition met";

/// How a run decides it is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    /// Every step is considered
    #[default]
    All,
    /// The run ends successfully as soon as one step completes
    FirstSuccess,
}

/// What to do with an existing checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Load the checkpoint and reuse completed steps
    #[default]
    Resume,
    /// Delete the checkpoint and start clean
    Regenerate,
}

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
        resumed_steps: usize,
    },
    StepStarted {
        step_id: String,
        attempt: usize,
        max_attempts: usize,
    },
    StepRetrying {
        step_id: String,
        attempt: usize,
        delay_ms: u64,
        failure: FailureRecord,
    },
    StepCached {
        step_id: String,
    },
    StepCompleted {
        step_id: String,
        source: ResultSource,
        attempts: usize,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    StepFallback {
        step_id: String,
        failure: FailureRecord,
    },
    StepFailed {
        step_id: String,
        failure: FailureRecord,
        message: String,
        required: bool,
    },
    CheckpointSaved {
        step_id: String,
        completed_steps: usize,
    },
    RunFinished {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// A step that ended without a result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedStep {
    pub step_id: String,
    pub failure: FailureRecord,
    pub message: String,
    pub attempts: usize,
}

/// A step that was bypassed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStep {
    pub step_id: String,
    pub reason: String,
}

/// Final state of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub state: StepState,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub status: ExecutionStatus,
    pub total_steps: usize,

    /// Results of completed steps, keyed by step id
    pub results: BTreeMap<String, Value>,

    /// Final state of every step, in execution order
    pub outcomes: Vec<StepOutcome>,

    /// Completed steps whose result came from a fallback
    pub fallbacks_used: Vec<String>,

    /// Confidence of each result
    pub confidence: BTreeMap<String, f64>,

    /// Optional steps that failed
    pub failed_steps: Vec<FailedStep>,

    pub skipped_steps: Vec<SkippedStep>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    /// Result of a step
    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    /// Whether the step's result came from a fallback
    pub fn fallback_used(&self, step_id: &str) -> bool {
        self.fallbacks_used.iter().any(|id| id == step_id)
    }

    /// True when no result came from a fallback
    pub fn is_high_fidelity(&self) -> bool {
        self.fallbacks_used.is_empty()
    }

    /// Get final state of a step
    pub fn outcome(&self, step_id: &str) -> Option<&StepState> {
        self.outcomes
            .iter()
            .find(|o| o.step_id == step_id)
            .map(|o| &o.state)
    }
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required step failed; `state` is what was persisted for resume
    #[error("Required step '{step_id}' failed ({failure}): {message}")]
    StepFailed {
        step_id: String,
        failure: FailureRecord,
        message: String,
        state: Box<PipelineState>,
    },

    #[error("Run cancelled before step '{next_step}'")]
    Cancelled {
        next_step: String,
        state: Box<PipelineState>,
    },

    /// No step completed under `AggregationPolicy::FirstSuccess`
    #[error("No step succeeded ({} failed)", failures.len())]
    NoSuccess { failures: Vec<FailedStep> },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl EngineError {
    /// State a later run can resume from, when there is one
    pub fn resumable_state(&self) -> Option<&PipelineState> {
        match self {
            EngineError::StepFailed { state, .. } | EngineError::Cancelled { state, .. } => {
                Some(state.as_ref())
            }
            _ => None,
        }
    }
}

/// How a step's attempt loop ended
enum StepRun {
    Succeeded {
        value: Value,
        source: ResultSource,
        attempts: usize,
    },
    Failed {
        failure: FailureRecord,
        message: String,
        attempts: usize,
    },
}

/// Main workflow execution engine
pub struct ExecutionEngine<G> {
    executor: StepExecutor<G>,
    checkpoints: Arc<dyn CheckpointStore>,
    fallback: Arc<dyn FallbackStrategy>,
    retry: RetryPolicy,
    policy: AggregationPolicy,
    cancelled: Arc<AtomicBool>,
    project_path: String,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl<G: Generator> ExecutionEngine<G> {
    pub fn new(generator: G, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            executor: StepExecutor::new(generator),
            checkpoints,
            fallback: Arc::new(NoFallback),
            retry: RetryPolicy::default(),
            policy: AggregationPolicy::All,
            cancelled: Arc::new(AtomicBool::new(false)),
            project_path: String::new(),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackStrategy>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_policy(mut self, policy: AggregationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a cancellation flag; it is checked before each step
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Project recorded in new checkpoints
    pub fn with_project_path(mut self, project_path: impl Into<String>) -> Self {
        self.project_path = project_path.into();
        self
    }

    /// Per-attempt timeout for steps that set none
    pub fn with_default_timeout(mut self, timeout_secs: u64) -> Self {
        self.executor = self.executor.with_default_timeout(timeout_secs);
        self
    }

    /// Flag that stops the run at the next step boundary
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the whole pipeline.
    ///
    /// Steps run one at a time in dependency order. The checkpoint is saved
    /// after every step that completes or finally fails, kept when a required
    /// step fails or the run is cancelled, and cleared once the run completes.
    pub async fn execute(&self, pipeline: &Pipeline, mode: RunMode) -> Result<RunReport, EngineError> {
        let started_at = Utc::now();
        let mut state = self.initial_state(mode).await?;
        let run_id = state.run_id;

        let resumed_steps = pipeline
            .steps()
            .iter()
            .filter(|s| state.is_completed(&s.id))
            .count();

        info!(
            "Starting pipeline execution: {} ({}), {} of {} steps already completed",
            pipeline.name,
            run_id,
            resumed_steps,
            pipeline.len()
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: pipeline.len(),
            resumed_steps,
        })
        .await;

        let mut context = pipeline.create_context();
        let mut scheduler = ExecutionScheduler::new(pipeline);
        let mut failures = Vec::new();
        let mut succeeded = false;

        while let Some(step_id) = scheduler.next_step(pipeline) {
            let Some(step) = pipeline.step(&step_id) else {
                break;
            };

            if self.cancelled.load(Ordering::SeqCst) {
                warn!("Run {} cancelled before step {}", run_id, step_id);
                self.emit_event(ExecutionEvent::RunFinished {
                    run_id,
                    status: ExecutionStatus::Cancelled,
                })
                .await;
                return Err(EngineError::Cancelled {
                    next_step: step_id,
                    state: Box::new(state),
                });
            }

            if state.is_completed(&step.id) {
                if let Some(result) = state.result(&step.id) {
                    context.set_step_output(&step.id, result.clone());
                }
                info!("Reusing checkpointed result for step {}", step.id);
                scheduler.set_state(
                    &step.id,
                    StepState::Completed {
                        source: ResultSource::Cached,
                        attempts: 0,
                        completed_at: Utc::now(),
                    },
                );
                self.emit_event(ExecutionEvent::StepCached {
                    step_id: step.id.clone(),
                })
                .await;

                if self.policy == AggregationPolicy::FirstSuccess {
                    succeeded = true;
                    break;
                }
                continue;
            }

            if let Some(dependency) = scheduler.blocking_dependency(step) {
                info!("Skipping step {}: dependency {} failed", step.id, dependency);
                scheduler.mark_blocked(&step.id);
                self.emit_event(ExecutionEvent::StepSkipped {
                    step_id: step.id.clone(),
                    reason: DEPENDENCY_FAILED.to_string(),
                })
                .await;
                continue;
            }

            context.current_step_id = Some(step.id.clone());
            if step.should_skip(&context) {
                info!("Skipping step {}: {}", step.id, SKIP_CONDITION_MET);
                scheduler.set_state(
                    &step.id,
                    StepState::Skipped {
                        reason: SKIP_CONDITION_MET.to_string(),
                    },
                );
                self.emit_event(ExecutionEvent::StepSkipped {
                    step_id: step.id.clone(),
                    reason: SKIP_CONDITION_MET.to_string(),
                })
                .await;
                continue;
            }

            state.begin_step(&step.id);
            match self.run_step(step, &context, &mut scheduler).await {
                StepRun::Succeeded {
                    value,
                    source,
                    attempts,
                } => {
                    state.record_success(&step.id, value.clone(), source == ResultSource::Fallback);
                    context.set_step_output(&step.id, value);
                    scheduler.set_state(
                        &step.id,
                        StepState::Completed {
                            source,
                            attempts,
                            completed_at: Utc::now(),
                        },
                    );

                    self.checkpoints.save(&state).await?;
                    debug!("Checkpoint saved after step {}", step.id);
                    self.emit_event(ExecutionEvent::CheckpointSaved {
                        step_id: step.id.clone(),
                        completed_steps: state.completed_steps.len(),
                    })
                    .await;
                    self.emit_event(ExecutionEvent::StepCompleted {
                        step_id: step.id.clone(),
                        source,
                        attempts,
                    })
                    .await;

                    if self.policy == AggregationPolicy::FirstSuccess {
                        succeeded = true;
                        break;
                    }
                }
                StepRun::Failed {
                    failure,
                    message,
                    attempts,
                } => {
                    scheduler.set_state(
                        &step.id,
                        StepState::FailedTerminal {
                            failure: failure.clone(),
                            attempts,
                            failed_at: Utc::now(),
                        },
                    );
                    self.emit_event(ExecutionEvent::StepFailed {
                        step_id: step.id.clone(),
                        failure: failure.clone(),
                        message: message.clone(),
                        required: step.required,
                    })
                    .await;

                    if step.required {
                        error!("Required step {} failed: {}", step.id, message);
                        state.record_failure(&step.id, failure.kind, message.clone());
                        if let Err(e) = self.checkpoints.save(&state).await {
                            warn!("Failed to save checkpoint after step {} failed: {}", step.id, e);
                        }
                        self.emit_event(ExecutionEvent::RunFinished {
                            run_id,
                            status: ExecutionStatus::Failed,
                        })
                        .await;
                        return Err(EngineError::StepFailed {
                            step_id: step.id.clone(),
                            failure,
                            message,
                            state: Box::new(state),
                        });
                    }

                    warn!("Optional step {} failed, continuing: {}", step.id, message);
                    if let Err(e) = self.checkpoints.save(&state).await {
                        warn!("Failed to save checkpoint after step {} failed: {}", step.id, e);
                    }
                    failures.push(FailedStep {
                        step_id: step.id.clone(),
                        failure,
                        message,
                        attempts,
                    });
                }
            }
        }

        if self.policy == AggregationPolicy::FirstSuccess && !succeeded {
            error!("No step of {} succeeded", pipeline.name);
            self.emit_event(ExecutionEvent::RunFinished {
                run_id,
                status: ExecutionStatus::Failed,
            })
            .await;
            return Err(EngineError::NoSuccess { failures });
        }

        self.checkpoints.clear().await?;

        let report = build_report(
            pipeline,
            &state,
            &scheduler,
            failures,
            started_at,
            ExecutionStatus::Completed,
        );

        info!(
            "Pipeline execution finished: {} - {} completed, {} skipped, {} failed, {} fallback(s)",
            pipeline.name,
            report.results.len(),
            report.skipped_steps.len(),
            report.failed_steps.len(),
            report.fallbacks_used.len()
        );
        self.emit_event(ExecutionEvent::RunFinished {
            run_id,
            status: report.status,
        })
        .await;

        Ok(report)
    }

    async fn initial_state(&self, mode: RunMode) -> Result<PipelineState, EngineError> {
        match mode {
            RunMode::Regenerate => {
                self.checkpoints.clear().await?;
                Ok(PipelineState::new(self.project_path.clone()))
            }
            RunMode::Resume => match self.checkpoints.load().await? {
                Some(mut state) => {
                    if let Some(failed) = &state.failed_step {
                        info!(
                            "Resuming run {} after failure of step {}",
                            state.run_id, failed
                        );
                    }
                    state.clear_failure();
                    Ok(state)
                }
                None => Ok(PipelineState::new(self.project_path.clone())),
            },
        }
    }

    /// Attempt loop for one step, followed by the fallback when attempts run out
    async fn run_step(
        &self,
        step: &StepDescriptor,
        context: &PipelineContext,
        scheduler: &mut ExecutionScheduler,
    ) -> StepRun {
        let max_attempts = self.retry.attempts_for(step);
        let mut last_failure = FailureRecord::new(FailureKind::Unknown);
        let mut last_message = String::new();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            scheduler.set_state(
                &step.id,
                StepState::Running {
                    started_at: Utc::now(),
                    attempt,
                },
            );
            self.emit_event(ExecutionEvent::StepStarted {
                step_id: step.id.clone(),
                attempt,
                max_attempts,
            })
            .await;

            let error = match self.executor.execute(step, context, attempt).await {
                Ok(output) => {
                    info!("Step {} completed successfully", step.id);
                    return StepRun::Succeeded {
                        value: Value::String(output),
                        source: ResultSource::Generated,
                        attempts,
                    };
                }
                Err(e) => e,
            };

            let failure = classify(&error);
            last_message = error.to_string();
            warn!(
                "Step {} attempt {}/{} failed: {} ({})",
                step.id, attempt, max_attempts, last_message, failure
            );

            if !failure.retryable || attempt == max_attempts {
                last_failure = failure;
                break;
            }

            let delay = self.retry.delay_for(attempt, &failure);
            scheduler.set_state(
                &step.id,
                StepState::FailedRetryable {
                    attempt,
                    failure: failure.clone(),
                },
            );
            self.emit_event(ExecutionEvent::StepRetrying {
                step_id: step.id.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                failure,
            })
            .await;
            tokio::time::sleep(delay).await;
        }

        if let Some(value) = self.fallback.fallback(step, context) {
            info!(
                "Using fallback for step {} after {} attempt(s)",
                step.id, attempts
            );
            self.emit_event(ExecutionEvent::StepFallback {
                step_id: step.id.clone(),
                failure: last_failure,
            })
            .await;
            return StepRun::Succeeded {
                value,
                source: ResultSource::Fallback,
                attempts,
            };
        }

        StepRun::Failed {
            failure: last_failure,
            message: last_message,
            attempts,
        }
    }
}

fn build_report(
    pipeline: &Pipeline,
    state: &PipelineState,
    scheduler: &ExecutionScheduler,
    failed_steps: Vec<FailedStep>,
    started_at: DateTime<Utc>,
    status: ExecutionStatus,
) -> RunReport {
    let mut results = BTreeMap::new();
    let mut confidence = BTreeMap::new();
    let mut fallbacks_used = Vec::new();
    let mut outcomes = Vec::with_capacity(pipeline.len());
    let mut skipped_steps = Vec::new();

    for step in pipeline.ordered_steps() {
        let step_state = scheduler
            .state(&step.id)
            .cloned()
            .unwrap_or(StepState::Pending);

        match &step_state {
            StepState::Completed { .. } => {
                if let Some(result) = state.result(&step.id) {
                    results.insert(step.id.clone(), result.clone());
                    confidence.insert(step.id.clone(), state.confidence(&step.id));
                    if state.used_fallback(&step.id) {
                        fallbacks_used.push(step.id.clone());
                    }
                }
            }
            StepState::Skipped { reason } => skipped_steps.push(SkippedStep {
                step_id: step.id.clone(),
                reason: reason.clone(),
            }),
            _ => {}
        }

        outcomes.push(StepOutcome {
            step_id: step.id.clone(),
            state: step_state,
        });
    }

    RunReport {
        run_id: state.run_id,
        pipeline_name: pipeline.name.clone(),
        status,
        total_steps: pipeline.len(),
        results,
        outcomes,
        fallbacks_used,
        confidence,
        failed_steps,
        skipped_steps,
        started_at,
        completed_at: Utc::now(),
    }
}
