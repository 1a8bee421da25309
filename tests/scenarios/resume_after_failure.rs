//! Test: a failed run resumes from its checkpoint without repeating finished work

use crate::helpers::*;
use std::sync::Arc;
use stepwise::core::{FailureKind, Pipeline};
use stepwise::execution::{EngineError, RunMode};
use stepwise::persistence::{CheckpointStore, FileCheckpointStore};
use stepwise::ResultSource;
use tempfile::TempDir;

/// Eight linear phases; phase4 keeps hitting network errors, then recovers
#[tokio::test]
async fn test_linear_run_resumes_at_failed_phase() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    let pipeline = Pipeline::linear("site build", phases(8)).unwrap();

    // First run: phase4 fails on every attempt
    let flaky = Arc::new(ScriptedGenerator::new().fail_times("phase4", 3, network_error()));
    let engine = engine_with(&flaky, store.clone());

    let err = engine.execute(&pipeline, RunMode::Resume).await.unwrap_err();
    match &err {
        EngineError::StepFailed { step_id, failure, .. } => {
            assert_eq!(step_id, "phase4");
            assert_eq!(failure.kind, FailureKind::NetworkError);
            assert!(failure.retryable);
        }
        other => panic!("Expected StepFailed, got {:?}", other),
    }

    assert_eq!(
        flaky.called_steps(),
        vec!["phase1", "phase2", "phase3", "phase4", "phase4", "phase4"]
    );
    assert_eq!(flaky.attempts_of("phase4"), vec![1, 2, 3]);
    assert_eq!(flaky.call_count("phase5"), 0);

    // The checkpoint on disk records the finished phases and the failure
    let checkpoint = store.load().await.unwrap().expect("checkpoint should exist");
    assert_eq!(checkpoint.completed_steps, vec!["phase1", "phase2", "phase3"]);
    assert_eq!(checkpoint.failed_step.as_deref(), Some("phase4"));
    assert_eq!(checkpoint.failure_kind, Some(FailureKind::NetworkError));
    assert_eq!(err.resumable_state().map(|s| s.run_id), Some(checkpoint.run_id));

    // Second run: the provider is healthy again
    let healthy = Arc::new(ScriptedGenerator::new());
    let engine = engine_with(&healthy, store.clone());

    let report = engine.execute(&pipeline, RunMode::Resume).await.unwrap();

    assert_eq!(
        healthy.called_steps(),
        vec!["phase4", "phase5", "phase6", "phase7", "phase8"]
    );
    // Attempt numbering restarts for the resumed step
    assert_eq!(healthy.attempts_of("phase4"), vec![1]);
    // Cached results still feed later prompts
    assert_eq!(
        healthy.prompts_of("phase4"),
        vec!["continue from phase3 output".to_string()]
    );

    assert_eq!(report.run_id, checkpoint.run_id);
    assert_eq!(report.results.len(), 8);
    for cached in ["phase1", "phase2", "phase3"] {
        assert_completed_from(&report, cached, ResultSource::Cached);
    }
    for generated in ["phase4", "phase5", "phase6", "phase7", "phase8"] {
        assert_completed_from(&report, generated, ResultSource::Generated);
    }
    assert!(report.is_high_fidelity());

    // A completed run leaves nothing behind
    assert!(store.load().await.unwrap().is_none());
    assert!(!store.path().exists());
}

/// Resuming twice after a completed run starts from scratch
#[tokio::test]
async fn test_completed_run_does_not_resume() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    let pipeline = Pipeline::linear("docs", phases(3)).unwrap();

    let first = Arc::new(ScriptedGenerator::new());
    engine_with(&first, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap();

    let second = Arc::new(ScriptedGenerator::new());
    let report = engine_with(&second, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap();

    assert_eq!(second.called_steps(), vec!["phase1", "phase2", "phase3"]);
    assert_completed_from(&report, "phase1", ResultSource::Generated);
}

/// A DAG run saves a checkpoint after each successful step
#[tokio::test]
async fn test_checkpoint_grows_step_by_step() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    let steps = vec![
        stepwise::StepDescriptor::new("prd").with_prompt("summarize"),
        stepwise::StepDescriptor::new("colors")
            .with_prompt("palette for {{ steps.prd.output }}")
            .depends_on(["prd"]),
        stepwise::StepDescriptor::new("layout")
            .with_prompt("layout for {{ steps.prd.output }}")
            .depends_on(["prd"]),
        stepwise::StepDescriptor::new("site")
            .with_prompt("build")
            .depends_on(["colors", "layout"]),
    ];
    let pipeline = Pipeline::new("design", steps).unwrap();

    let generator = Arc::new(ScriptedGenerator::new().fail_times("site", 3, auth_error()));
    let err = engine_with(&generator, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap_err();

    // Authentication failures are not retried
    assert_eq!(generator.call_count("site"), 1);
    let state = err.resumable_state().unwrap();
    assert_eq!(state.completed_steps, vec!["prd", "colors", "layout"]);
    assert_eq!(state.failure_kind, Some(FailureKind::AuthError));
    assert_eq!(
        generator.prompts_of("colors"),
        vec!["palette for prd output".to_string()]
    );
}
