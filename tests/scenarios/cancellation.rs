//! Test: cancellation stops at a step boundary and the run resumes later

use crate::helpers::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stepwise::core::Pipeline;
use stepwise::execution::{EngineError, ExecutionEvent, RunMode};
use stepwise::persistence::{CheckpointStore, FileCheckpointStore};
use stepwise::ResultSource;
use tempfile::TempDir;

#[tokio::test]
async fn test_cancel_then_resume() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    let pipeline = Pipeline::linear("site", phases(5)).unwrap();

    let first = Arc::new(ScriptedGenerator::new());
    let engine = engine_with(&first, store.clone());
    let cancel = engine.cancellation_flag();
    engine
        .add_event_handler(move |event| {
            if let ExecutionEvent::CheckpointSaved { step_id, .. } = &event {
                if step_id == "phase2" {
                    cancel.store(true, Ordering::SeqCst);
                }
            }
        })
        .await;

    let err = engine.execute(&pipeline, RunMode::Resume).await.unwrap_err();
    match &err {
        EngineError::Cancelled { next_step, .. } => assert_eq!(next_step, "phase3"),
        other => panic!("Expected Cancelled, got {:?}", other),
    }
    assert_eq!(first.called_steps(), vec!["phase1", "phase2"]);

    let checkpoint = store.load().await.unwrap().expect("checkpoint kept after cancel");
    assert_eq!(checkpoint.completed_steps, vec!["phase1", "phase2"]);
    assert!(checkpoint.failed_step.is_none());

    let second = Arc::new(ScriptedGenerator::new());
    let report = engine_with(&second, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap();

    assert_eq!(second.called_steps(), vec!["phase3", "phase4", "phase5"]);
    assert_completed_from(&report, "phase2", ResultSource::Cached);
    assert_eq!(report.run_id, checkpoint.run_id);
}

/// A flag set before the run starts stops it before the first step
#[tokio::test]
async fn test_cancelled_before_start() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    let pipeline = Pipeline::linear("site", phases(2)).unwrap();

    let generator = Arc::new(ScriptedGenerator::new());
    let engine = engine_with(&generator, store.clone());
    engine.cancellation_flag().store(true, Ordering::SeqCst);
    let events = record_events(&engine).await;

    let err = engine.execute(&pipeline, RunMode::Resume).await.unwrap_err();

    assert!(matches!(err, EngineError::Cancelled { ref next_step, .. } if next_step == "phase1"));
    assert!(generator.calls().is_empty());
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        ExecutionEvent::RunFinished {
            status: stepwise::ExecutionStatus::Cancelled,
            ..
        }
    )));
}
