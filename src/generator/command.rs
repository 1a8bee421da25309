//! Command-line generator - runs an external text-generation CLI

use crate::generator::{GenerateOptions, Generator, GeneratorConfig, GeneratorError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Generator that executes a program and returns its stdout
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    config: GeneratorConfig,
}

impl CommandGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Get the program path
    pub fn program(&self) -> &str {
        self.config.program()
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    /// Calls `<command> <args...> <prompt>` and captures stdout.
    ///
    /// # Errors
    /// Returns `GeneratorError` if:
    /// - The program cannot be spawned
    /// - The program exits with a non-zero status (stderr becomes the message)
    /// - The output is not valid UTF-8
    /// - The command times out
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, GeneratorError> {
        debug!(
            "Spawning {} for step {} (attempt {}), prompt length: {}",
            self.program(),
            options.step_id,
            options.attempt,
            prompt.len()
        );

        let timeout_secs = self.config.timeout_secs;
        let result = timeout(
            Duration::from_secs(timeout_secs),
            Command::new(self.program())
                .args(&self.config.args)
                .arg(prompt)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| GeneratorError::Timeout(timeout_secs))?;

        let output = result.map_err(|e| {
            GeneratorError::Internal(format!("Failed to execute {}: {}", self.program(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(
                "{} exited with code {}: {}",
                self.program(),
                exit_code,
                stderr.trim()
            );
            return Err(GeneratorError::api(
                status_from_stderr(&stderr),
                format!("{} exited with code {}: {}", self.program(), exit_code, stderr.trim()),
            ));
        }

        let content = String::from_utf8(output.stdout).map_err(|e| {
            GeneratorError::Internal(format!("Failed to decode {} output: {}", self.program(), e))
        })?;

        debug!("{} returned {} bytes of output", self.program(), content.len());

        Ok(content)
    }
}

/// Pull an HTTP status code out of CLI error text such as "Error code: 429"
fn status_from_stderr(stderr: &str) -> Option<u16> {
    static STATUS: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = STATUS
        .get_or_init(|| Regex::new(r"(?i)(?:status|error code|http)[ :=/]*([1-5]\d\d)\b").ok())
        .as_ref()?;
    regex
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
