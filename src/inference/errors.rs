//! Reasoning-backend error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured
//! logging is the caller's responsibility; these types carry the context
//! needed to build meaningful log entries.

use thiserror::Error;

/// Text signatures that mark an error as throttling, regardless of which
/// layer produced it. Matched case-insensitively.
const RATE_LIMIT_SIGNATURES: [&str; 5] = [
    "rate limit",
    "rate_limit",
    "too many requests",
    "throttl",
    "overloaded",
];

/// Errors from the reasoning backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request never completed: connection, TLS, or body transfer failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend asked us to slow down (HTTP 429 or 529).
    #[error("rate limited [{status}]: {body}")]
    RateLimited { status: u16, body: String },

    /// Any other non-2xx response.
    #[error("api error [{status}]: {body}")]
    Api { status: u16, body: String },

    /// A 2xx response whose body did not parse as a Messages response.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },
}

impl BackendError {
    /// Whether this failure is throttling and worth a round-level retry.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            BackendError::RateLimited { .. } => true,
            BackendError::Api { body, .. } => is_rate_limit_message(body),
            _ => false,
        }
    }
}

/// Match `text` against the throttle signatures.
///
/// Also applied to tool-result error text, since the tool server relays its
/// own upstream rate limits as execution errors.
pub fn is_rate_limit_message(text: &str) -> bool {
    let lowered = text.to_lowercase();
    RATE_LIMIT_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_variant_is_rate_limited() {
        let err = BackendError::RateLimited {
            status: 429,
            body: "{}".to_string(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_api_error_with_throttle_body_is_rate_limited() {
        let err = BackendError::Api {
            status: 400,
            body: r#"{"error":{"type":"rate_limit_error"}}"#.to_string(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_plain_api_error_is_not_rate_limited() {
        let err = BackendError::Api {
            status: 401,
            body: "invalid x-api-key".to_string(),
        };
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn test_rate_limit_signatures() {
        assert!(is_rate_limit_message("Rate limit exceeded"));
        assert!(is_rate_limit_message("rate_limit_error"));
        assert!(is_rate_limit_message("429 Too Many Requests"));
        assert!(is_rate_limit_message("request was throttled upstream"));
        assert!(is_rate_limit_message("Overloaded"));
        assert!(!is_rate_limit_message("permission denied"));
        assert!(!is_rate_limit_message("device not found"));
    }
}
