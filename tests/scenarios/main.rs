//! Scenario-based tests for stepwise

mod helpers;

mod cancellation;
mod checkpoint_recovery;
mod containment;
mod provider_chain;
mod resume_after_failure;
mod workflow_config;
