//! Deterministic fallback strategies

use crate::core::{render_template, PipelineContext, StepDescriptor};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Produces a result for a step without calling the generator.
///
/// Implementations must be pure: no network, same input gives the same
/// output. Returning `None` means no fallback is permitted for the step.
pub trait FallbackStrategy: Send + Sync {
    fn fallback(&self, step: &StepDescriptor, context: &PipelineContext) -> Option<Value>;
}

/// Never provides a fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackStrategy for NoFallback {
    fn fallback(&self, _step: &StepDescriptor, _context: &PipelineContext) -> Option<Value> {
        None
    }
}

/// Per-step template strings rendered from the run context
#[derive(Debug, Clone, Default)]
pub struct TemplateFallback {
    templates: HashMap<String, String>,
}

impl TemplateFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step_id: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(step_id.into(), template.into());
    }

    pub fn with_template(mut self, step_id: impl Into<String>, template: impl Into<String>) -> Self {
        self.insert(step_id, template);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl FallbackStrategy for TemplateFallback {
    fn fallback(&self, step: &StepDescriptor, context: &PipelineContext) -> Option<Value> {
        let template = self.templates.get(&step.id)?;
        let rendered = render_template(template, &context.get_rendering_variables());
        Some(Value::String(rendered))
    }
}

/// Fallback closure for a single step
pub type FallbackFn = Arc<dyn Fn(&PipelineContext) -> Value + Send + Sync>;

/// Registry of per-step fallback closures
#[derive(Clone, Default)]
pub struct FnFallback {
    handlers: HashMap<String, FallbackFn>,
}

impl FnFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, step_id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&PipelineContext) -> Value + Send + Sync + 'static,
    {
        self.handlers.insert(step_id.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.handlers.contains_key(step_id)
    }
}

impl std::fmt::Debug for FnFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut steps: Vec<&String> = self.handlers.keys().collect();
        steps.sort();
        f.debug_struct("FnFallback").field("steps", &steps).finish()
    }
}

impl FallbackStrategy for FnFallback {
    fn fallback(&self, step: &StepDescriptor, context: &PipelineContext) -> Option<Value> {
        self.handlers.get(&step.id).map(|handler| handler(context))
    }
}
