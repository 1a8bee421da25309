//! Provider chain - tries generators in order until one succeeds

use crate::{
    core::{value_as_text, Pipeline, StepDescriptor},
    execution::{
        engine::{AggregationPolicy, EngineError, ExecutionEngine, RunMode},
        retry::RetryPolicy,
    },
    generator::{GenerateOptions, Generator, GeneratorError},
    persistence::checkpoint::InMemoryCheckpointStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const STEP_PREFIX: &str = "provider:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderChainError {
    #[error("Provider '{0}' is already in the chain")]
    DuplicateProvider(String),
}

/// Ordered list of generators; the first one that succeeds wins.
///
/// Each provider becomes an optional pseudo-step without dependencies, and the
/// chain runs them through the regular engine with `FirstSuccess`
/// aggregation, so providers get the same retry and classification rules as
/// workflow steps.
#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<(String, Arc<dyn Generator>)>,
    retry: RetryPolicy,
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            retry: RetryPolicy::new(1, 0),
        }
    }
}

impl ProviderChain {
    /// An empty chain; each provider gets one attempt
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; names must be unique within the chain
    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, ProviderChainError> {
        let name = name.into();
        if self.providers.iter().any(|(existing, _)| *existing == name) {
            return Err(ProviderChainError::DuplicateProvider(name));
        }
        self.providers.push((name, generator));
        Ok(self)
    }

    /// Retry policy applied to each provider before moving to the next one
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Provider names in the order they are tried
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn pipeline(&self) -> Result<Pipeline, GeneratorError> {
        let steps = self
            .providers
            .iter()
            .map(|(name, _)| StepDescriptor::new(format!("{STEP_PREFIX}{name}")).optional())
            .collect();
        Pipeline::new("provider-chain", steps).map_err(|e| GeneratorError::Internal(e.to_string()))
    }
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("providers", &self.provider_names())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Routes each pseudo-step to its provider with the caller's prompt
struct ProviderRouter {
    prompt: String,
    providers: HashMap<String, Arc<dyn Generator>>,
}

#[async_trait]
impl Generator for ProviderRouter {
    async fn generate(&self, _prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError> {
        let provider = self.providers.get(&options.step_id).ok_or_else(|| {
            GeneratorError::Internal(format!("No provider for step {}", options.step_id))
        })?;
        debug!("Trying {} (attempt {})", options.step_id, options.attempt);
        provider.generate(&self.prompt, options).await
    }
}

#[async_trait]
impl Generator for ProviderChain {
    /// Returns the first provider's output that succeeds.
    ///
    /// # Errors
    /// When every provider fails, the last failure is returned as a
    /// `GeneratorError::Classified` so callers classify it by kind.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError> {
        if self.providers.is_empty() {
            return Err(GeneratorError::Internal("Provider chain is empty".to_string()));
        }

        let pipeline = self.pipeline()?;
        let router = ProviderRouter {
            prompt: prompt.to_string(),
            providers: self
                .providers
                .iter()
                .map(|(name, generator)| (format!("{STEP_PREFIX}{name}"), generator.clone()))
                .collect(),
        };

        let engine = ExecutionEngine::new(router, Arc::new(InMemoryCheckpointStore::new()))
            .with_policy(AggregationPolicy::FirstSuccess)
            .with_retry_policy(self.retry)
            .with_default_timeout(options.timeout_secs);

        match engine.execute(&pipeline, RunMode::Regenerate).await {
            Ok(report) => report
                .results
                .values()
                .next()
                .map(value_as_text)
                .ok_or_else(|| GeneratorError::Internal("Provider chain produced no result".to_string())),
            Err(EngineError::NoSuccess { failures }) => {
                warn!("All {} providers failed for {}", failures.len(), options.step_id);
                match failures.last() {
                    Some(last) => Err(GeneratorError::classified(
                        last.failure.kind,
                        format!(
                            "all providers failed; last was {}: {}",
                            last.step_id.trim_start_matches(STEP_PREFIX),
                            last.message
                        ),
                    )),
                    None => Err(GeneratorError::Internal("All providers failed".to_string())),
                }
            }
            Err(e) => Err(GeneratorError::Internal(e.to_string())),
        }
    }
}
