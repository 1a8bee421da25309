//! Test: optional failures stay contained, required failures abort

use crate::helpers::*;
use std::sync::Arc;
use stepwise::core::{FailureKind, Pipeline, StepDescriptor};
use stepwise::execution::scheduler::DEPENDENCY_FAILED;
use stepwise::execution::{EngineError, RunMode};
use stepwise::persistence::InMemoryCheckpointStore;
use stepwise::ResultSource;

fn design_steps(icons_required: bool) -> Vec<StepDescriptor> {
    let icons = StepDescriptor::new("icons").with_prompt("draw icons");
    let icons = if icons_required { icons } else { icons.optional() };
    vec![
        StepDescriptor::new("prd").with_prompt("summarize"),
        icons.depends_on(["prd"]),
        StepDescriptor::new("icon_sprites")
            .with_prompt("pack {{ steps.icons.output }}")
            .depends_on(["icons"]),
        StepDescriptor::new("icon_docs")
            .with_prompt("document sprites")
            .depends_on(["icon_sprites"]),
        StepDescriptor::new("colors")
            .with_prompt("palette")
            .depends_on(["prd"]),
    ]
}

/// Dependents of a failed optional step are skipped; the rest of the run continues
#[tokio::test]
async fn test_optional_failure_skips_only_dependents() {
    let pipeline = Pipeline::new("design", design_steps(false)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new().fail_times("icons", 3, network_error()));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let engine = engine_with(&generator, store.clone());

    let report = engine.execute(&pipeline, RunMode::Resume).await.unwrap();

    assert_eq!(generator.call_count("icons"), 3);
    assert_eq!(generator.call_count("icon_sprites"), 0);
    assert_eq!(generator.call_count("icon_docs"), 0);
    assert_completed_from(&report, "colors", ResultSource::Generated);

    assert_skipped_with(&report, "icon_sprites", DEPENDENCY_FAILED);
    assert_skipped_with(&report, "icon_docs", DEPENDENCY_FAILED);

    assert_eq!(report.failed_steps.len(), 1);
    assert_eq!(report.failed_steps[0].step_id, "icons");
    assert_eq!(report.failed_steps[0].failure.kind, FailureKind::NetworkError);
    assert_eq!(report.failed_steps[0].attempts, 3);

    // The run completed, so the checkpoint is gone
    assert!(store.snapshot().is_none());
}

/// The same failure on a required step aborts before anything downstream runs
#[tokio::test]
async fn test_required_failure_aborts_run() {
    let pipeline = Pipeline::new("design", design_steps(true)).unwrap();
    let generator = Arc::new(ScriptedGenerator::new().fail_times("icons", 3, network_error()));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let engine = engine_with(&generator, store.clone());

    let err = engine.execute(&pipeline, RunMode::Resume).await.unwrap_err();

    match err {
        EngineError::StepFailed { step_id, message, .. } => {
            assert_eq!(step_id, "icons");
            assert!(message.contains("connection reset"));
        }
        other => panic!("Expected StepFailed, got {:?}", other),
    }
    assert_eq!(generator.called_steps(), vec!["prd", "icons", "icons", "icons"]);
    assert_eq!(generator.call_count("colors"), 0);
    assert_eq!(
        store.snapshot().and_then(|s| s.failed_step),
        Some("icons".to_string())
    );
}

/// In linear mode a failed optional phase does not hold up later phases
#[tokio::test]
async fn test_linear_optional_failure_continues() {
    let mut steps = phases(4);
    steps[1] = StepDescriptor::new("phase2")
        .with_prompt("optional polish")
        .optional();
    let pipeline = Pipeline::linear("polish", steps).unwrap();
    let generator = Arc::new(ScriptedGenerator::new().fail_times("phase2", 1, auth_error()));
    let engine = engine_with(&generator, Arc::new(InMemoryCheckpointStore::new()));

    let report = engine.execute(&pipeline, RunMode::Resume).await.unwrap();

    assert_eq!(generator.called_steps(), vec!["phase1", "phase2", "phase3", "phase4"]);
    assert_completed_from(&report, "phase3", ResultSource::Generated);
    assert_completed_from(&report, "phase4", ResultSource::Generated);
    assert!(report.skipped_steps.is_empty());
    assert_eq!(report.failed_steps[0].step_id, "phase2");
    // Nothing to substitute for the failed phase
    assert_eq!(
        generator.prompts_of("phase3"),
        vec!["continue from {{ steps.phase2.output }}".to_string()]
    );
}
