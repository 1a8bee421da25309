//! Failure taxonomy shared by the classifier, the checkpoint and the run report

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named category of a generator failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    RateLimit,
    Timeout,
    AuthError,
    NetworkError,
    QuotaExceeded,
    Unknown,
}

impl FailureKind {
    /// Whether a failure of this kind is worth another attempt by default
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::RateLimit | FailureKind::Timeout | FailureKind::NetworkError
        )
    }

    /// Remediation hints shown to the operator
    pub fn suggestions(self) -> Vec<String> {
        let hints: &[&str] = match self {
            FailureKind::RateLimit => &[
                "Wait a minute before resuming the run",
                "Lower the request rate or switch to a provider with a higher limit",
            ],
            FailureKind::Timeout => &[
                "Increase the step timeout_secs",
                "Check whether the provider is degraded and resume later",
            ],
            FailureKind::AuthError => &[
                "Verify the API key for the configured provider",
                "Check that the key has access to the requested model",
            ],
            FailureKind::NetworkError => &[
                "Check your network connection",
                "Resume the run once connectivity is restored",
            ],
            FailureKind::QuotaExceeded => &[
                "Check the billing status and usage quota of your provider account",
                "Switch to another provider or wait for the quota to reset",
            ],
            FailureKind::Unknown => &[
                "Re-run with --verbose to see the full generator error",
            ],
        };
        hints.iter().map(|h| h.to_string()).collect()
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::RateLimit => "rate limit",
            FailureKind::Timeout => "timeout",
            FailureKind::AuthError => "authentication",
            FailureKind::NetworkError => "network",
            FailureKind::QuotaExceeded => "quota exceeded",
            FailureKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Classification verdict for one failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub retryable: bool,
    pub retry_after_seconds: Option<u64>,
    pub suggestions: Vec<String>,
}

impl FailureRecord {
    /// Record with the default retry verdict and hints for `kind`
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            retryable: kind.default_retryable(),
            retry_after_seconds: None,
            suggestions: kind.suggestions(),
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure", self.kind)?;
        if !self.retryable {
            write!(f, " (not retryable)")?;
        }
        Ok(())
    }
}
