//! Pipeline context - shared variables and accumulated step results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Execution context for a pipeline run
///
/// Contains shared variables and the results of completed steps.
/// Skip predicates, prompt rendering and fallbacks all read from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    /// Global and user-defined variables
    pub variables: HashMap<String, String>,

    /// Results of completed steps (step_id -> result)
    pub step_outputs: BTreeMap<String, Value>,

    /// The current step being executed (if any)
    pub current_step_id: Option<String>,
}

impl PipelineContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with variables
    pub fn with_variables(variables: HashMap<String, String>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: String, value: String) {
        self.variables.insert(key, value);
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Set the result of a step
    pub fn set_step_output(&mut self, step_id: &str, output: Value) {
        self.step_outputs.insert(step_id.to_string(), output);
    }

    /// Get the result of a step
    pub fn get_step_output(&self, step_id: &str) -> Option<&Value> {
        self.step_outputs.get(step_id)
    }

    /// Get the result of a step as prompt text
    pub fn step_output_text(&self, step_id: &str) -> Option<String> {
        self.step_outputs.get(step_id).map(value_as_text)
    }

    /// Get all variables available for prompt rendering
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        for (step_id, output) in &self.step_outputs {
            vars.insert(format!("steps.{}.output", step_id), value_as_text(output));
        }

        if let Some(ref current_step) = self.current_step_id {
            vars.insert("current_step".to_string(), current_step.clone());
        }

        vars
    }
}

/// Render a result value as text; strings are used verbatim, other values as JSON
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
