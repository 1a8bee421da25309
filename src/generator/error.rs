//! Generator error types

use crate::core::FailureKind;
use thiserror::Error;

/// Error returned by a generator call
///
/// The engine never looks at provider internals; it hands the error to the
/// classifier, which reads the structured kind, the status code and the message.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// The backend answered with an error
    #[error("API error: {message}")]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// The backend already knows what went wrong
    #[error("{kind} error: {message}")]
    Classified { kind: FailureKind, message: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GeneratorError {
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        GeneratorError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn classified(kind: FailureKind, message: impl Into<String>) -> Self {
        GeneratorError::Classified {
            kind,
            message: message.into(),
        }
    }

    /// HTTP-like status code, when the backend provided one
    pub fn status(&self) -> Option<u16> {
        match self {
            GeneratorError::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Failure kind stated by the backend itself
    pub fn kind_hint(&self) -> Option<FailureKind> {
        match self {
            GeneratorError::Classified { kind, .. } => Some(*kind),
            GeneratorError::Timeout(_) => Some(FailureKind::Timeout),
            _ => None,
        }
    }

    /// Human-readable message
    pub fn message(&self) -> String {
        match self {
            GeneratorError::Api { message, .. }
            | GeneratorError::Classified { message, .. }
            | GeneratorError::Internal(message) => message.clone(),
            GeneratorError::Timeout(_) => self.to_string(),
        }
    }
}
