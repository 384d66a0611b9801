//! Errors raised by embedding and chat model backends.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single call to an embedding function or language model.
///
/// Providers classify their failures so the orchestrator can decide whether
/// a retry is worthwhile. Messages carry HTTP status and provider detail,
/// never the text that was sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The call did not complete within its deadline.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// Network failure, rate limiting (HTTP 429) or a server-side error.
    #[error("model service unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (HTTP 4xx other than 429).
    #[error("model request rejected: {0}")]
    Rejected(String),

    /// The provider answered with something that could not be parsed.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// The provider is configured as `disabled`.
    #[error("model provider is disabled")]
    Disabled,
}

impl ModelError {
    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Timeout(_) | ModelError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes() {
        assert!(ModelError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ModelError::Unavailable("503".into()).is_transient());
        assert!(!ModelError::Rejected("401".into()).is_transient());
        assert!(!ModelError::InvalidResponse("no data".into()).is_transient());
        assert!(!ModelError::Disabled.is_transient());
    }
}
