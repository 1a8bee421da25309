//! Failure classification - maps a generator error to a failure record

use crate::core::{FailureKind, FailureRecord};
use crate::generator::GeneratorError;

/// Seconds to wait after a rate-limit response
pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

/// Classify a failed generator call.
///
/// Total and deterministic. Structured information wins over text: first the
/// kind stated by the backend, then the status code, and only then substring
/// matching on the lower-cased message. Anything unmatched is `Unknown` and
/// not retried.
pub fn classify(error: &GeneratorError) -> FailureRecord {
    if let Some(kind) = error.kind_hint() {
        return record_for(kind);
    }

    if let Some(status) = error.status() {
        if let Some(record) = classify_status(status) {
            return record;
        }
    }

    classify_message(&error.message())
}

fn record_for(kind: FailureKind) -> FailureRecord {
    match kind {
        FailureKind::RateLimit => {
            FailureRecord::new(kind).with_retry_after(RATE_LIMIT_RETRY_AFTER_SECS)
        }
        _ => FailureRecord::new(kind),
    }
}

fn classify_status(status: u16) -> Option<FailureRecord> {
    match status {
        429 => Some(record_for(FailureKind::RateLimit)),
        401 | 403 => Some(record_for(FailureKind::AuthError)),
        402 => Some(record_for(FailureKind::QuotaExceeded)),
        408 | 504 => Some(record_for(FailureKind::Timeout)),
        500..=599 => Some(FailureRecord::new(FailureKind::Unknown).with_retryable(true)),
        _ => None,
    }
}

fn classify_message(message: &str) -> FailureRecord {
    let message = message.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    let kind = if contains_any(&["rate limit", "rate_limit", "too many requests"]) {
        FailureKind::RateLimit
    } else if contains_any(&["quota", "insufficient credit", "billing"]) {
        FailureKind::QuotaExceeded
    } else if contains_any(&["timeout", "timed out"]) {
        FailureKind::Timeout
    } else if contains_any(&["unauthorized", "invalid api key", "authentication", "forbidden"]) {
        FailureKind::AuthError
    } else if contains_any(&["network", "connection", "dns", "unreachable"]) {
        FailureKind::NetworkError
    } else {
        FailureKind::Unknown
    };

    record_for(kind)
}
