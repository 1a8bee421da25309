//! Pipeline domain model and dependency resolution

use crate::core::{
    context::PipelineContext,
    step::StepDescriptor,
};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Configuration errors found while ordering steps
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Duplicate step ID: {0}")]
    DuplicateStep(String),

    #[error("Step '{step}' depends on non-existent step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cycle detected in dependency graph involving steps: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// A validated, ordered set of steps
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Global variables available to all steps
    pub variables: HashMap<String, String>,

    /// Steps in declaration order
    steps: Vec<StepDescriptor>,

    /// Indices into `steps`, dependencies first
    execution_order: Vec<usize>,
}

impl Pipeline {
    /// Build a pipeline, rejecting duplicate ids, unknown dependencies and cycles
    pub fn new(name: impl Into<String>, steps: Vec<StepDescriptor>) -> Result<Self, ResolveError> {
        let execution_order = resolve_order(&steps)?;
        Ok(Pipeline {
            name: name.into(),
            variables: HashMap::new(),
            steps,
            execution_order,
        })
    }

    /// Build a linear pipeline: each step depends on the one declared before it
    pub fn linear(name: impl Into<String>, steps: Vec<StepDescriptor>) -> Result<Self, ResolveError> {
        Self::new(name, chain_steps(steps))
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order
    pub fn ordered_steps(&self) -> impl Iterator<Item = &StepDescriptor> + '_ {
        self.execution_order.iter().map(move |&i| &self.steps[i])
    }

    /// Step ids in execution order
    pub fn execution_order(&self) -> Vec<String> {
        self.ordered_steps().map(|s| s.id.clone()).collect()
    }

    /// Every step `id` depends on, directly or through other steps
    pub fn ancestors(&self, id: &str) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(step) = self.step(current) else {
                continue;
            };
            for dep in &step.depends_on {
                if seen.insert(dep.as_str()) {
                    queue.push_back(dep.as_str());
                }
            }
        }
        seen
    }

    /// Create the initial context for a run
    pub fn create_context(&self) -> PipelineContext {
        PipelineContext::with_variables(self.variables.clone())
    }
}

/// Give every step without declared dependencies a dependency on its predecessor
pub fn chain_steps(mut steps: Vec<StepDescriptor>) -> Vec<StepDescriptor> {
    for i in 1..steps.len() {
        if steps[i].depends_on.is_empty() {
            let previous = steps[i - 1].id.clone();
            steps[i].depends_on.push(previous);
            steps[i].chained = true;
        }
    }
    steps
}

/// Topological order of `steps` (Kahn's algorithm)
///
/// Among steps whose dependencies are all placed, the one declared first goes
/// first, so the order is deterministic.
pub fn resolve_order(steps: &[StepDescriptor]) -> Result<Vec<usize>, ResolveError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if index.insert(step.id.as_str(), i).is_some() {
            return Err(ResolveError::DuplicateStep(step.id.clone()));
        }
    }

    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (i, step) in steps.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &step.depends_on {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            let &d = index.get(dep.as_str()).ok_or_else(|| ResolveError::UnknownDependency {
                step: step.id.clone(),
                dependency: dep.clone(),
            })?;
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    // Ready set kept sorted by declaration index
    let mut ready: VecDeque<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());

    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                let pos = ready.partition_point(|&r| r < next);
                ready.insert(pos, next);
            }
        }
    }

    if order.len() != steps.len() {
        let placed: HashSet<usize> = order.into_iter().collect();
        let stuck = (0..steps.len())
            .filter(|i| !placed.contains(i))
            .map(|i| steps[i].id.clone())
            .collect();
        return Err(ResolveError::Cycle(stuck));
    }

    Ok(order)
}
