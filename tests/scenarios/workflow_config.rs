//! Test: workflows loaded from YAML run end to end

use crate::helpers::*;
use std::io::Write;
use std::sync::Arc;
use stepwise::core::config::WorkflowConfig;
use stepwise::execution::{RunMode, SKIP_CONDITION_MET};
use stepwise::persistence::{FileCheckpointStore, InMemoryCheckpointStore};
use stepwise::ResultSource;
use tempfile::{NamedTempFile, TempDir};

const LANDING_PAGE: &str = r#"
name: "Landing page"
mode: linear
max_retries: 2
base_delay_ms: 0

variables:
  company: "Acme"
  has_logo: "yes"

steps:
  - id: "brief"
    prompt: "Brief for {{ company }}"

  - id: "logo"
    prompt: "Logo for {{ company }}"
    skip_if:
      variable_equals:
        name: "has_logo"
        value: "yes"

  - id: "tagline"
    prompt: "Tagline from {{ steps.brief.output }}"
    fallback: "{{ company }}: built for you"

  - id: "faq"
    required: false
    prompt: "FAQ"
    skip_if:
      output_matches:
        step: "brief"
        pattern: "^brief"
        use_regex: true

  - id: "page"
    prompt: "Page with {{ steps.tagline.output }}"
"#;

#[tokio::test]
async fn test_yaml_workflow_with_skips_and_fallback() {
    let config = WorkflowConfig::from_yaml(LANDING_PAGE).unwrap();
    let pipeline = config.to_pipeline().unwrap();

    let generator = Arc::new(ScriptedGenerator::new().fail_times("tagline", 5, network_error()));
    let engine = engine_with(&generator, Arc::new(InMemoryCheckpointStore::new()))
        .with_retry_policy(config.retry_policy())
        .with_fallback(Arc::new(config.fallbacks()));

    let report = engine.execute(&pipeline, RunMode::Resume).await.unwrap();

    assert_eq!(generator.called_steps(), vec!["brief", "tagline", "tagline", "page"]);
    assert_eq!(generator.prompts_of("brief"), vec!["Brief for Acme".to_string()]);

    assert_skipped_with(&report, "logo", SKIP_CONDITION_MET);
    assert_skipped_with(&report, "faq", SKIP_CONDITION_MET);
    assert_completed_from(&report, "tagline", ResultSource::Fallback);
    assert_eq!(
        generator.prompts_of("page"),
        vec!["Page with Acme: built for you".to_string()]
    );
    assert_eq!(report.skipped_steps.len(), 2);
    assert_eq!(report.fallbacks_used, vec!["tagline"]);
}

/// Variable overrides change which steps a skip predicate bypasses
#[tokio::test]
async fn test_variable_override_disables_skip() {
    let config = WorkflowConfig::from_yaml(LANDING_PAGE).unwrap();
    let mut pipeline = config.to_pipeline().unwrap();
    pipeline.variables.insert("has_logo".to_string(), "no".to_string());
    pipeline.variables.insert("company".to_string(), "Globex".to_string());

    let generator = Arc::new(ScriptedGenerator::replying("ok"));
    let engine = engine_with(&generator, Arc::new(InMemoryCheckpointStore::new()));

    let report = engine.execute(&pipeline, RunMode::Resume).await.unwrap();

    assert_eq!(generator.prompts_of("logo"), vec!["Logo for Globex".to_string()]);
    // "ok" does not start with "brief", so the FAQ runs too
    assert_eq!(generator.call_count("faq"), 1);
    assert!(report.skipped_steps.is_empty());
}

/// A workflow file on disk drives a resumable DAG run
#[tokio::test]
async fn test_workflow_file_dag_run() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
name: "Docs"
base_delay_ms: 0
steps:
  - id: "outline"
    prompt: "Outline"
  - id: "api"
    depends_on: ["outline"]
    prompt: "API docs from {{{{ steps.outline.output }}}}"
  - id: "guide"
    depends_on: ["outline"]
    required: false
    retryable: false
    prompt: "Guide"
  - id: "index"
    depends_on: ["api"]
    prompt: "Index"
"#
    )
    .unwrap();

    let config = WorkflowConfig::from_file(file.path()).unwrap();
    let pipeline = config.to_pipeline().unwrap();
    assert_eq!(pipeline.execution_order(), vec!["outline", "api", "guide", "index"]);

    let project = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::for_project(project.path()));
    let generator = Arc::new(ScriptedGenerator::new().fail_times("guide", 1, network_error()));
    let engine = engine_with(&generator, store)
        .with_retry_policy(config.retry_policy())
        .with_project_path(project.path().display().to_string());

    let report = engine.execute(&pipeline, RunMode::Resume).await.unwrap();

    // A non-retryable step gets a single attempt even for retryable failures
    assert_eq!(generator.call_count("guide"), 1);
    assert_eq!(report.failed_steps.len(), 1);
    assert_eq!(
        generator.prompts_of("api"),
        vec!["API docs from outline output".to_string()]
    );
    assert_completed_from(&report, "index", ResultSource::Generated);
}

#[test]
fn test_cyclic_workflow_is_rejected() {
    let yaml = r#"
name: "Loop"
steps:
  - id: "a"
    depends_on: ["b"]
    prompt: "a"
  - id: "b"
    depends_on: ["a"]
    prompt: "b"
"#;

    let err = WorkflowConfig::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).to_lowercase().contains("cycle"));
}
