//! stepwise - resumable, checkpointed workflow executor for generation pipelines

pub mod cli;
pub mod core;
pub mod execution;
pub mod generator;
pub mod persistence;

// Re-export commonly used types
pub use core::{
    ExecutionStatus, FailureKind, FailureRecord, Pipeline, PipelineContext, PipelineState,
    ResultSource, StepDescriptor, StepState,
};
pub use execution::{
    AggregationPolicy, EngineError, ExecutionEngine, ExecutionEvent, FallbackStrategy, ProviderChain,
    RetryPolicy, RunMode, RunReport,
};
pub use generator::{CommandGenerator, GenerateOptions, Generator, GeneratorConfig, GeneratorError};
pub use persistence::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
