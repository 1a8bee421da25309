//! Generator backend configuration

use serde::{Deserialize, Serialize};

/// Configuration for the command-line generator backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Program to run; the prompt is passed as its last argument.
    /// If not provided, defaults to "llm" (assumes it's on PATH).
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments placed before the prompt
    #[serde(default)]
    pub args: Vec<String>,

    /// Hard limit for one invocation, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Program that will be executed
    pub fn program(&self) -> &str {
        self.command.as_deref().unwrap_or("llm")
    }
}
