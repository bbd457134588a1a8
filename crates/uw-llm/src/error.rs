//! Generative service error types.

use thiserror::Error;

/// Status codes that describe a request the provider will never accept:
/// bad request, unauthorized, forbidden, not found, payload too large,
/// unprocessable.
pub const NON_RETRYABLE_STATUSES: &[u16] = &[400, 401, 403, 404, 413, 422];

#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport error (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status code.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider returned 429 Too Many Requests.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Response body did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// No endpoint or credentials configured.
    #[error("generative service not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Whether another attempt could succeed.
    ///
    /// The client-error statuses in [`NON_RETRYABLE_STATUSES`] and missing
    /// configuration are final; everything else is treated as transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => !NON_RETRYABLE_STATUSES.contains(status),
            Self::Http(e) => e
                .status()
                .is_none_or(|s| !NON_RETRYABLE_STATUSES.contains(&s.as_u16())),
            Self::NotConfigured(_) => false,
            Self::RateLimited { .. } | Self::Parse(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(400, false)]
    #[case(401, false)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(413, false)]
    #[case(422, false)]
    #[case(408, true)]
    #[case(409, true)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    #[case(529, true)]
    fn api_status_classification(#[case] status: u16, #[case] retryable: bool) {
        let err = LlmError::Api {
            status,
            message: String::new(),
        };
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn rate_limit_and_parse_are_transient() {
        assert!(LlmError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(LlmError::Parse("truncated".into()).is_retryable());
        assert!(!LlmError::NotConfigured("api_key".into()).is_retryable());
    }
}
