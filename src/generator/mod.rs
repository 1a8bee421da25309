//! Text-generation backends

pub mod command;
pub mod config;
pub mod error;

use async_trait::async_trait;
use std::sync::Arc;

pub use command::CommandGenerator;
pub use config::GeneratorConfig;
pub use error::GeneratorError;

/// Per-call options handed to a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Step the call belongs to
    pub step_id: String,

    /// 1-based attempt number within the current run
    pub attempt: usize,

    /// Time budget for this call
    pub timeout_secs: u64,
}

impl GenerateOptions {
    pub fn new(step_id: impl Into<String>, attempt: usize, timeout_secs: u64) -> Self {
        Self {
            step_id: step_id.into(),
            attempt,
            timeout_secs,
        }
    }
}

/// Trait for text generation - allows for different implementations
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for a rendered prompt
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError> {
        (**self).generate(prompt, options).await
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Box<G> {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError> {
        (**self).generate(prompt, options).await
    }
}
