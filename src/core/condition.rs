//! Skip conditions - declarative skip predicates loaded from configuration

use crate::core::context::PipelineContext;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern for matching step output (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum ConditionPattern {
    /// Simple string contains match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl ConditionPattern {
    /// Build a pattern, compiling it when `use_regex` is set
    pub fn new(pattern: &str, use_regex: bool) -> Result<Self, regex::Error> {
        if use_regex {
            Ok(ConditionPattern::Regex(Regex::new(pattern)?))
        } else {
            Ok(ConditionPattern::Simple(pattern.to_string()))
        }
    }

    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ConditionPattern::Simple(pattern) => text.contains(pattern),
            ConditionPattern::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Skip condition as written in the workflow YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipConditionConfig {
    /// Skip when a variable has the given value
    VariableEquals { name: String, value: String },

    /// Skip when a variable is not set
    VariableMissing { name: String },

    /// Skip when an earlier step's result matches a pattern
    OutputMatches {
        step: String,
        pattern: String,
        #[serde(default)]
        use_regex: bool,
    },

    /// Skip when an earlier step already has a result in the context
    StepHasResult { step: String },
}

impl SkipConditionConfig {
    /// The step whose result the condition reads, if any
    pub fn referenced_step(&self) -> Option<&str> {
        match self {
            SkipConditionConfig::OutputMatches { step, .. }
            | SkipConditionConfig::StepHasResult { step } => Some(step),
            _ => None,
        }
    }
}

/// Compiled skip condition, evaluated against the accumulated context
#[derive(Debug, Clone)]
pub enum SkipCondition {
    VariableEquals { name: String, value: String },
    VariableMissing { name: String },
    OutputMatches { step: String, pattern: ConditionPattern },
    StepHasResult { step: String },
}

impl SkipCondition {
    /// Compile a configured condition
    pub fn from_config(config: &SkipConditionConfig) -> Result<Self, regex::Error> {
        Ok(match config {
            SkipConditionConfig::VariableEquals { name, value } => SkipCondition::VariableEquals {
                name: name.clone(),
                value: value.clone(),
            },
            SkipConditionConfig::VariableMissing { name } => {
                SkipCondition::VariableMissing { name: name.clone() }
            }
            SkipConditionConfig::OutputMatches {
                step,
                pattern,
                use_regex,
            } => SkipCondition::OutputMatches {
                step: step.clone(),
                pattern: ConditionPattern::new(pattern, *use_regex)?,
            },
            SkipConditionConfig::StepHasResult { step } => {
                SkipCondition::StepHasResult { step: step.clone() }
            }
        })
    }

    /// Evaluate the condition; true means the step is skipped
    pub fn evaluate(&self, context: &PipelineContext) -> bool {
        match self {
            SkipCondition::VariableEquals { name, value } => {
                context.get_variable(name).is_some_and(|v| v == value)
            }
            SkipCondition::VariableMissing { name } => context.get_variable(name).is_none(),
            SkipCondition::OutputMatches { step, pattern } => context
                .step_output_text(step)
                .is_some_and(|text| pattern.matches(&text)),
            SkipCondition::StepHasResult { step } => context.get_step_output(step).is_some(),
        }
    }
}
