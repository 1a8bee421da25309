//! Test: a provider chain used as the generator of a workflow

use crate::helpers::*;
use std::collections::HashMap;
use std::sync::Arc;
use stepwise::core::{FailureKind, Pipeline, StepDescriptor};
use stepwise::execution::{EngineError, ProviderChain, RunMode};
use stepwise::generator::GeneratorError;
use stepwise::persistence::InMemoryCheckpointStore;
use stepwise::ResultSource;

fn copy_pipeline() -> Pipeline {
    let mut variables = HashMap::new();
    variables.insert("product".to_string(), "rocket skates".to_string());
    Pipeline::new(
        "copy",
        vec![
            StepDescriptor::new("headline").with_prompt("Headline for {{ product }}"),
            StepDescriptor::new("body")
                .with_prompt("Body under {{ steps.headline.output }}")
                .depends_on(["headline"]),
        ],
    )
    .unwrap()
    .with_variables(variables)
}

/// The backup provider answers when the primary is out of quota
#[tokio::test]
async fn test_backup_provider_serves_every_step() {
    let primary = Arc::new(ScriptedGenerator::always_failing(GeneratorError::api(
        Some(402),
        "insufficient credit",
    )));
    let backup = Arc::new(ScriptedGenerator::replying("from backup"));
    let chain = ProviderChain::new()
        .with_provider("primary", primary.clone())
        .unwrap()
        .with_provider("backup", backup.clone())
        .unwrap();

    let engine = stepwise::ExecutionEngine::new(chain, Arc::new(InMemoryCheckpointStore::new()))
        .with_retry_policy(fast_retry());
    let report = engine.execute(&copy_pipeline(), RunMode::Resume).await.unwrap();

    // Quota failures are not retried within a provider
    assert_eq!(primary.calls().len(), 2);
    assert_eq!(backup.calls().len(), 2);
    assert_eq!(
        backup.calls()[0].prompt,
        "Headline for rocket skates".to_string()
    );
    assert_eq!(backup.calls()[1].prompt, "Body under from backup".to_string());

    assert_completed_from(&report, "body", ResultSource::Generated);
    assert_eq!(
        report.output("body").and_then(|v| v.as_str()),
        Some("from backup")
    );
}

/// When every provider fails, the step sees the last provider's failure kind
#[tokio::test]
async fn test_exhausted_chain_fails_step_with_last_kind() {
    let primary = Arc::new(ScriptedGenerator::always_failing(auth_error()));
    let backup = Arc::new(ScriptedGenerator::always_failing(rate_limit_error()));
    let chain = ProviderChain::new()
        .with_provider("primary", primary.clone())
        .unwrap()
        .with_provider("backup", backup.clone())
        .unwrap();

    let engine = stepwise::ExecutionEngine::new(chain, Arc::new(InMemoryCheckpointStore::new()))
        .with_retry_policy(fast_retry());
    let err = engine.execute(&copy_pipeline(), RunMode::Resume).await.unwrap_err();

    match err {
        EngineError::StepFailed {
            step_id,
            failure,
            message,
            ..
        } => {
            assert_eq!(step_id, "headline");
            assert_eq!(failure.kind, FailureKind::RateLimit);
            assert!(message.contains("last was backup"));
        }
        other => panic!("Expected StepFailed, got {:?}", other),
    }

    // A rate limit is retryable, so the whole chain is tried on every attempt
    assert_eq!(primary.calls().len(), 3);
    assert_eq!(backup.calls().len(), 3);
}
