//! Step executor - runs a single generator attempt for a step

use crate::{
    core::{PipelineContext, StepDescriptor},
    generator::{GenerateOptions, Generator, GeneratorError},
};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

/// Default per-attempt time budget when a step sets none
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Executes one attempt of a step
pub struct StepExecutor<G> {
    generator: G,
    default_timeout_secs: u64,
}

impl<G: Generator> StepExecutor<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            default_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
        }
    }

    pub fn with_default_timeout(mut self, timeout_secs: u64) -> Self {
        self.default_timeout_secs = timeout_secs;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Run one attempt of a step and return the raw generator output.
    ///
    /// The prompt is rendered from the context. The call is bounded by the
    /// step's timeout and expiry is reported as `GeneratorError::Timeout`.
    pub async fn execute(
        &self,
        step: &StepDescriptor,
        context: &PipelineContext,
        attempt: usize,
    ) -> Result<String, GeneratorError> {
        info!("Executing step: {} (attempt {})", step.id, attempt);

        let prompt = step.render_prompt(&context.get_rendering_variables());
        debug!("Effective prompt for step {}: {}", step.id, prompt);

        let timeout_secs = step.timeout_secs.unwrap_or(self.default_timeout_secs);
        let options = GenerateOptions::new(step.id.clone(), attempt, timeout_secs);

        match timeout(
            Duration::from_secs(timeout_secs),
            self.generator.generate(&prompt, &options),
        )
        .await
        {
            Ok(Ok(output)) => {
                debug!("Generator response for step {}: {} bytes", step.id, output.len());
                Ok(output)
            }
            Ok(Err(e)) => {
                error!("Generator error for step {}: {}", step.id, e);
                Err(e)
            }
            Err(_) => {
                error!("Timeout for step {} after {}s", step.id, timeout_secs);
                Err(GeneratorError::Timeout(timeout_secs))
            }
        }
    }
}
