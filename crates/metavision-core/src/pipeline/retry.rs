//! Retry utilities for transient upload failures.
//!
//! Provides classification of retryable errors and exponential backoff.

use crate::error::PipelineError;
use std::time::Duration;

/// Determine whether a pipeline error is worth retrying.
///
/// Retryable errors: timeouts, rate limits (429), server errors (5xx).
/// Non-retryable: bad keys, rejected images, validation failures.
pub fn is_retryable(error: &PipelineError) -> bool {
    match error {
        PipelineError::Timeout { .. } => true,
        PipelineError::Upload {
            status_code,
            message,
        } => {
            if let Some(code) = status_code {
                return *code == 429 || (500..=599).contains(code);
            }
            // No status: connection refused, DNS failure, reset
            message.contains("timed out") || message.contains("connect")
        }
        _ => false,
    }
}

/// Calculate exponential backoff duration for a given attempt.
///
/// Uses `base_delay * 2^attempt` with a cap at 30 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(30_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(message: &str, status_code: Option<u16>) -> PipelineError {
        PipelineError::Upload {
            message: message.to_string(),
            status_code,
        }
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = PipelineError::Timeout {
            name: "photo.jpg".to_string(),
            stage: "upload".to_string(),
            timeout_ms: 60000,
        };
        assert!(is_retryable(&err));
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_retryable() {
        assert!(is_retryable(&upload("HTTP 429", Some(429))));
        assert!(is_retryable(&upload("HTTP 503", Some(503))));
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert!(!is_retryable(&upload("HTTP 400: invalid API key", Some(400))));
        assert!(!is_retryable(&upload("HTTP 401", Some(401))));
    }

    #[test]
    fn test_body_mentioning_500_not_retryable_without_status() {
        assert!(!is_retryable(&upload("image exceeds 500 pixels", None)));
    }

    #[test]
    fn test_connection_error_retryable_without_status() {
        assert!(is_retryable(&upload("error trying to connect", None)));
    }

    #[test]
    fn test_validation_error_not_retryable() {
        let err = PipelineError::UnsupportedType {
            name: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
        };
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_backoff_exponential() {
        assert_eq!(backoff_duration(0, 1000), Duration::from_millis(1000));
        assert_eq!(backoff_duration(1, 1000), Duration::from_millis(2000));
        assert_eq!(backoff_duration(3, 1000), Duration::from_millis(8000));
    }

    #[test]
    fn test_backoff_capped_at_30s() {
        assert_eq!(backoff_duration(10, 1000), Duration::from_millis(30_000));
    }
}
