//! Step domain model

use crate::core::{
    condition::SkipCondition,
    config::StepConfig,
    context::PipelineContext,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Predicate over the accumulated context; true means "skip this step"
pub type SkipPredicate = Arc<dyn Fn(&PipelineContext) -> bool + Send + Sync>;

/// Static definition of one unit of work
#[derive(Clone)]
pub struct StepDescriptor {
    /// Unique step identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// The prompt template sent to the generator
    pub prompt_template: String,

    /// Steps that must be completed (or skipped) first
    pub depends_on: Vec<String>,

    /// A required step's failure aborts the run
    pub required: bool,

    /// Whether failed attempts may be retried
    pub retryable: bool,

    /// Attempt limit for this step (overrides the engine default)
    pub max_retries: Option<usize>,

    /// Per-attempt timeout in seconds (overrides the engine default)
    pub timeout_secs: Option<u64>,

    skip: Option<SkipPredicate>,

    /// The single dependency was added by linear chaining; it orders the step
    /// but a failure there does not block it
    pub(crate) chained: bool,
}

impl StepDescriptor {
    /// A required, retryable step with no dependencies
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            prompt_template: String::new(),
            id,
            depends_on: Vec::new(),
            required: true,
            retryable: true,
            max_retries: None,
            timeout_secs: None,
            skip: None,
            chained: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_template = prompt.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Mark the step optional: its failure is recorded and the run continues
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Mark the step as single-attempt
    pub fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Attach a skip predicate
    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PipelineContext) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Result<Self, regex::Error> {
        let mut step = StepDescriptor::new(config.id.clone())
            .with_name(config.name.clone().unwrap_or_else(|| config.id.clone()))
            .with_prompt(config.prompt.clone())
            .depends_on(config.depends_on.iter().cloned())
            .with_max_retries(config.max_retries.unwrap_or(defaults.max_retries))
            .with_timeout(config.timeout_secs.unwrap_or(defaults.timeout_secs));
        step.required = config.required;
        step.retryable = config.retryable;

        if let Some(skip_if) = &config.skip_if {
            let condition = SkipCondition::from_config(skip_if)?;
            step = step.skip_when(move |ctx| condition.evaluate(ctx));
        }

        Ok(step)
    }

    /// Evaluate the skip predicate; steps without one never skip
    pub fn should_skip(&self, context: &PipelineContext) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(context))
    }

    /// Whether the step's only dependency comes from linear chaining
    pub fn is_chained(&self) -> bool {
        self.chained
    }

    /// Render the prompt with variable substitution
    pub fn render_prompt(&self, variables: &HashMap<String, String>) -> String {
        render_template(&self.prompt_template, variables)
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("required", &self.required)
            .field("retryable", &self.retryable)
            .field("max_retries", &self.max_retries)
            .field("timeout_secs", &self.timeout_secs)
            .field("skip", &self.skip.is_some())
            .field("chained", &self.chained)
            .finish()
    }
}

/// Replace `{{ name }}` placeholders with variable values
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{ {} }}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    rendered
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_secs: 300, // 5 minutes
        }
    }
}
