//! Workflow configuration from YAML

use crate::core::{
    condition::{SkipCondition, SkipConditionConfig},
    pipeline::{chain_steps, Pipeline},
    step::{StepDefaults, StepDescriptor},
};
use crate::execution::{fallback::TemplateFallback, retry::RetryPolicy};
use crate::generator::GeneratorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// How steps without `depends_on` are ordered
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Only declared dependencies are enforced
    #[default]
    Dag,
    /// A step without `depends_on` depends on the previous declared step
    Linear,
}

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Workflow version (optional)
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub mode: WorkflowMode,

    /// Global variables available to all steps
    #[serde(default)]
    variables: HashMap<String, Value>,

    /// Workflow steps
    pub steps: Vec<StepConfig>,

    /// Maximum attempts per step (global default)
    #[serde(default)]
    pub max_retries: Option<usize>,

    /// Base delay for linear backoff, in milliseconds
    #[serde(default)]
    pub base_delay_ms: Option<u64>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Generator backend settings
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// Optional step description
    #[serde(default)]
    pub description: Option<String>,

    /// The prompt template for this step
    #[serde(default)]
    pub prompt: String,

    /// List of step IDs this step depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// A required step's failure aborts the run
    #[serde(default = "default_true")]
    pub required: bool,

    /// Whether failed attempts may be retried
    #[serde(default = "default_true")]
    pub retryable: bool,

    /// Maximum attempts for this step (overrides global)
    #[serde(default)]
    pub max_retries: Option<usize>,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Deterministic result template used when the generator gives up
    #[serde(default)]
    pub fallback: Option<String>,

    /// Condition under which the step is bypassed
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub skip_if: Option<SkipConditionConfig>,
}

fn default_true() -> bool {
    true
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            anyhow::bail!("Workflow '{}' has no steps", self.name);
        }

        for step in &self.steps {
            if step.id.trim().is_empty() {
                anyhow::bail!("Step IDs must not be empty");
            }

            if let Some(skip_if) = &step.skip_if {
                SkipCondition::from_config(skip_if).with_context(|| {
                    format!("Step '{}' has an invalid skip_if pattern", step.id)
                })?;
            }
        }

        // Duplicate ids, unknown dependencies and cycles
        let pipeline = self.to_pipeline()?;

        // Predicates that read a step's result must name a step that runs first
        for step in &self.steps {
            let Some(referenced) = step.skip_if.as_ref().and_then(|c| c.referenced_step()) else {
                continue;
            };
            if pipeline.step(referenced).is_none() {
                anyhow::bail!(
                    "Step '{}' has a skip_if on non-existent step '{}'",
                    step.id,
                    referenced
                );
            }
            if !pipeline.ancestors(&step.id).contains(referenced) {
                anyhow::bail!(
                    "Step '{}' has a skip_if on step '{}', which is not one of its dependencies",
                    step.id,
                    referenced
                );
            }
        }

        Ok(())
    }

    pub fn step_defaults(&self) -> StepDefaults {
        let fallback = StepDefaults::default();
        StepDefaults {
            max_retries: self.max_retries.unwrap_or(fallback.max_retries),
            timeout_secs: self.default_timeout_secs.unwrap_or(fallback.timeout_secs),
        }
    }

    /// Retry policy for the engine
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(max_retries) = self.max_retries {
            policy.max_retries = max_retries;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            policy.base_delay_ms = base_delay_ms;
        }
        policy
    }

    /// Fallback templates declared on steps
    pub fn fallbacks(&self) -> TemplateFallback {
        let mut fallback = TemplateFallback::new();
        for step in &self.steps {
            if let Some(template) = &step.fallback {
                fallback.insert(step.id.clone(), template.clone());
            }
        }
        fallback
    }

    /// Variables rendered as strings
    pub fn variables_as_string_map(&self) -> HashMap<String, String> {
        self.variables
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => serde_yaml::to_string(other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        let defaults = self.step_defaults();

        let steps = self
            .steps
            .iter()
            .map(|config| {
                StepDescriptor::from_config(config, &defaults)
                    .with_context(|| format!("Invalid step '{}'", config.id))
            })
            .collect::<Result<Vec<_>>>()?;

        let steps = match self.mode {
            WorkflowMode::Dag => steps,
            WorkflowMode::Linear => chain_steps(steps),
        };

        let pipeline = Pipeline::new(self.name.clone(), steps)?
            .with_variables(self.variables_as_string_map());
        Ok(pipeline)
    }
}
