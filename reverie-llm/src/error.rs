//! LLM error types.

use reverie_core::ProviderError;
use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// LLM response was not in the expected shape.
    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    /// Request timed out.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// LLM provider is unavailable.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("All LLM retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error message from the final attempt.
        last_error: String,
    },

    /// Configuration error.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}

impl From<LlmError> for ProviderError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(ms) => ProviderError::Timeout(ms),
            LlmError::ParseError(msg) => ProviderError::Parse(msg),
            LlmError::Unavailable(msg) | LlmError::ConfigError(msg) => {
                ProviderError::Unavailable(msg)
            }
            LlmError::RequestFailed(msg) => ProviderError::Unavailable(msg),
            LlmError::RetriesExhausted { attempts, last_error } => ProviderError::Unavailable(
                format!("retries exhausted after {attempts} attempts: {last_error}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_mapping_preserves_kind() {
        assert!(matches!(
            ProviderError::from(LlmError::Timeout(5000)),
            ProviderError::Timeout(5000)
        ));
        assert!(matches!(
            ProviderError::from(LlmError::ParseError("bad json".into())),
            ProviderError::Parse(_)
        ));
        assert!(matches!(
            ProviderError::from(LlmError::Unavailable("down".into())),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::from(LlmError::RetriesExhausted {
                attempts: 3,
                last_error: "connection refused".into()
            }),
            ProviderError::Unavailable(_)
        ));
    }
}
