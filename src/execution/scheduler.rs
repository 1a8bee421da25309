//! Execution scheduler - tracks step states and determines which step runs next

use crate::core::{Pipeline, StepDescriptor, StepState};
use std::collections::{HashMap, HashSet};

/// Reason recorded on steps bypassed because a dependency failed
pub const DEPENDENCY_FAILED: &str = "dependency failed";

/// Sequential scheduler over a resolved pipeline
///
/// Steps are handed out one at a time in execution order. A step becomes
/// ready once every dependency is terminal.
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    order: Vec<String>,
    states: HashMap<String, StepState>,
    blocked: HashSet<String>,
}

impl ExecutionScheduler {
    pub fn new(pipeline: &Pipeline) -> Self {
        let order = pipeline.execution_order();
        let states = order
            .iter()
            .map(|id| (id.clone(), StepState::Pending))
            .collect();

        Self {
            order,
            states,
            blocked: HashSet::new(),
        }
    }

    /// Current state of a step
    pub fn state(&self, step_id: &str) -> Option<&StepState> {
        self.states.get(step_id)
    }

    pub fn set_state(&mut self, step_id: &str, state: StepState) {
        self.states.insert(step_id.to_string(), state);
    }

    /// Mark a step skipped because one of its dependencies failed
    pub fn mark_blocked(&mut self, step_id: &str) {
        self.blocked.insert(step_id.to_string());
        self.set_state(
            step_id,
            StepState::Skipped {
                reason: DEPENDENCY_FAILED.to_string(),
            },
        );
    }

    /// Next pending step whose dependencies are all terminal
    pub fn next_step(&self, pipeline: &Pipeline) -> Option<String> {
        self.order
            .iter()
            .filter(|id| matches!(self.states.get(*id), Some(StepState::Pending)))
            .find(|id| {
                pipeline.step(id).is_some_and(|step| {
                    step.depends_on.iter().all(|dep| {
                        self.states.get(dep).is_some_and(StepState::is_terminal)
                    })
                })
            })
            .cloned()
    }

    /// The dependency that prevents a step from running, if any.
    ///
    /// A dependency blocks when it failed terminally or was itself blocked.
    /// A linear-chaining dependency only orders the step and never blocks it.
    pub fn blocking_dependency(&self, step: &StepDescriptor) -> Option<String> {
        if step.is_chained() {
            return None;
        }

        step.depends_on
            .iter()
            .find(|dep| {
                self.blocked.contains(*dep)
                    || matches!(self.states.get(*dep), Some(StepState::FailedTerminal { .. }))
            })
            .cloned()
    }
}
