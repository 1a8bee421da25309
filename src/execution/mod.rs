//! Workflow execution engine

pub mod classifier;
pub mod engine;
pub mod executor;
pub mod fallback;
pub mod provider_chain;
pub mod retry;
pub mod scheduler;

pub use classifier::classify;
pub use engine::{
    AggregationPolicy, EngineError, EventHandler, ExecutionEngine, ExecutionEvent, FailedStep,
    RunMode, RunReport, SkippedStep, StepOutcome, SKIP_CONDITION_MET,
};
pub use executor::StepExecutor;
pub use fallback::{FallbackStrategy, FnFallback, NoFallback, TemplateFallback};
pub use provider_chain::{ProviderChain, ProviderChainError};
pub use retry::RetryPolicy;
pub use scheduler::ExecutionScheduler;
