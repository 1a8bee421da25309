//! Test utility functions for stepwise scenarios

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use stepwise::core::{FailureKind, StepDescriptor, StepState};
use stepwise::execution::{ExecutionEngine, ExecutionEvent, RetryPolicy, RunReport};
use stepwise::generator::{GenerateOptions, Generator, GeneratorError};
use stepwise::persistence::CheckpointStore;
use stepwise::ResultSource;

/// One recorded generator call
#[derive(Debug, Clone)]
pub struct Call {
    pub step_id: String,
    pub attempt: usize,
    pub prompt: String,
}

/// Generator that replays scripted failures per step and records every call
#[derive(Default)]
pub struct ScriptedGenerator {
    failures: Mutex<HashMap<String, VecDeque<GeneratorError>>>,
    always: Option<GeneratorError>,
    reply: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `error`
    pub fn always_failing(error: GeneratorError) -> Self {
        Self {
            always: Some(error),
            ..Self::default()
        }
    }

    /// Every successful call returns `reply`
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// The next `times` calls for `step_id` fail with `error`
    pub fn fail_times(self, step_id: &str, times: usize, error: GeneratorError) -> Self {
        {
            let mut failures = self.failures.lock().unwrap();
            let queue = failures.entry(step_id.to_string()).or_default();
            for _ in 0..times {
                queue.push_back(error.clone());
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Step ids in call order, one entry per attempt
    pub fn called_steps(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.step_id).collect()
    }

    pub fn call_count(&self, step_id: &str) -> usize {
        self.calls().iter().filter(|c| c.step_id == step_id).count()
    }

    pub fn attempts_of(&self, step_id: &str) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter(|c| c.step_id == step_id)
            .map(|c| c.attempt)
            .collect()
    }

    pub fn prompts_of(&self, step_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.step_id == step_id)
            .map(|c| c.prompt)
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError> {
        self.calls.lock().unwrap().push(Call {
            step_id: options.step_id.clone(),
            attempt: options.attempt,
            prompt: prompt.to_string(),
        });

        if let Some(error) = &self.always {
            return Err(error.clone());
        }

        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&options.step_id)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        Ok(self
            .reply
            .clone()
            .unwrap_or_else(|| format!("{} output", options.step_id)))
    }
}

/// Retries without waiting between attempts
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, 0)
}

pub fn network_error() -> GeneratorError {
    GeneratorError::classified(FailureKind::NetworkError, "connection reset by peer")
}

pub fn auth_error() -> GeneratorError {
    GeneratorError::api(Some(401), "invalid api key")
}

pub fn rate_limit_error() -> GeneratorError {
    GeneratorError::api(Some(429), "Too Many Requests")
}

/// Engine over a shared scripted generator with instant retries
pub fn engine_with(
    generator: &Arc<ScriptedGenerator>,
    store: Arc<dyn CheckpointStore>,
) -> ExecutionEngine<Arc<ScriptedGenerator>> {
    ExecutionEngine::new(generator.clone(), store).with_retry_policy(fast_retry())
}

/// Collect every event the engine emits
pub async fn record_events<G: Generator>(engine: &ExecutionEngine<G>) -> Arc<Mutex<Vec<ExecutionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .add_event_handler(move |event| sink.lock().unwrap().push(event))
        .await;
    events
}

/// Steps `phase1`..`phaseN`, each prompt quoting the previous result
pub fn phases(count: usize) -> Vec<StepDescriptor> {
    (1..=count)
        .map(|n| {
            let prompt = if n == 1 {
                "start the project".to_string()
            } else {
                format!("continue from {{{{ steps.phase{}.output }}}}", n - 1)
            };
            StepDescriptor::new(format!("phase{}", n)).with_prompt(prompt)
        })
        .collect()
}

pub fn assert_completed_from(report: &RunReport, step_id: &str, expected: ResultSource) {
    match report.outcome(step_id) {
        Some(StepState::Completed { source, .. }) => assert_eq!(
            *source, expected,
            "step {} completed from {:?}, expected {:?}",
            step_id, source, expected
        ),
        other => panic!("step {} did not complete: {:?}", step_id, other),
    }
}

pub fn assert_skipped_with(report: &RunReport, step_id: &str, expected: &str) {
    match report.outcome(step_id) {
        Some(StepState::Skipped { reason }) => assert_eq!(reason, expected),
        other => panic!("step {} was not skipped: {:?}", step_id, other),
    }
}
