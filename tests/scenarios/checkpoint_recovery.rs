//! Test: damaged checkpoints, regeneration and partial checkpoint contents

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use stepwise::core::{Pipeline, PipelineState};
use stepwise::execution::RunMode;
use stepwise::persistence::{CheckpointStore, FileCheckpointStore};
use stepwise::ResultSource;
use tempfile::TempDir;

/// A checkpoint cut off mid-write is treated as missing
#[tokio::test]
async fn test_truncated_checkpoint_starts_fresh() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), r#"{"runId":"0d6f","completedSteps":["phase1""#).unwrap();

    let pipeline = Pipeline::linear("site", phases(3)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new());
    let report = engine_with(&generator, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap();

    assert_eq!(generator.called_steps(), vec!["phase1", "phase2", "phase3"]);
    assert_completed_from(&report, "phase1", ResultSource::Generated);
    assert!(!store.path().exists());
}

/// Regenerate ignores a valid checkpoint and reruns every step
#[tokio::test]
async fn test_regenerate_discards_checkpoint() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));

    let mut previous = PipelineState::new(project.path().display().to_string());
    previous.record_success("phase1", json!("old phase1"), false);
    previous.record_success("phase2", json!("old phase2"), false);
    store.save(&previous).await.unwrap();

    let pipeline = Pipeline::linear("site", phases(3)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new());
    let report = engine_with(&generator, store.clone())
        .execute(&pipeline, RunMode::Regenerate)
        .await
        .unwrap();

    assert_eq!(generator.called_steps(), vec!["phase1", "phase2", "phase3"]);
    assert_ne!(report.run_id, previous.run_id);
    assert_eq!(report.output("phase1"), Some(&json!("phase1 output")));
}

/// Resume reuses stored results, including ones that came from a fallback
#[tokio::test]
async fn test_resume_keeps_fallback_marker() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));

    let mut previous = PipelineState::new("site");
    previous.record_success("phase1", json!("generated"), false);
    previous.record_success("phase2", json!("fallback palette"), true);
    store.save(&previous).await.unwrap();

    let pipeline = Pipeline::linear("site", phases(3)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new());
    let report = engine_with(&generator, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap();

    assert_eq!(generator.called_steps(), vec!["phase3"]);
    assert_eq!(
        generator.prompts_of("phase3"),
        vec!["continue from fallback palette".to_string()]
    );
    assert_completed_from(&report, "phase2", ResultSource::Cached);
    assert!(report.fallback_used("phase2"));
    assert!(!report.is_high_fidelity());
}

/// A step listed as completed but without a stored result runs again
#[tokio::test]
async fn test_completed_step_without_result_reruns() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));

    let mut previous = PipelineState::new("site");
    previous.record_success("phase1", json!("phase1 output"), false);
    previous.completed_steps.push("phase2".to_string());
    store.save(&previous).await.unwrap();

    let pipeline = Pipeline::linear("site", phases(3)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new());
    engine_with(&generator, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap();

    assert_eq!(generator.called_steps(), vec!["phase2", "phase3"]);
}

/// The checkpoint written after each step is valid camelCase JSON
#[tokio::test]
async fn test_checkpoint_file_format() {
    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));

    let pipeline = Pipeline::linear("site", phases(3)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new().fail_times("phase2", 3, network_error()));
    engine_with(&generator, store.clone())
        .execute(&pipeline, RunMode::Resume)
        .await
        .unwrap_err();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["completedSteps"], json!(["phase1"]));
    assert_eq!(value["failedStep"], json!("phase2"));
    assert_eq!(value["partialResults"]["phase1"], json!("phase1 output"));
    assert!(value["runId"].is_string());
}
