//! Error types for the REVERIE core engine.

use thiserror::Error;

/// Top-level error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No memory index exists for the given character.
    #[error("No such character: {0}")]
    CharacterNotFound(crate::CharacterId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors returned by external providers (embedding / language model).
///
/// These are never fatal to the engine: every call site degrades to a
/// documented default (importance 5, unembedded record, skipped cluster,
/// empty reflection list) instead of surfacing the failure to the caller.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider is unreachable or not configured.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer within the caller-supplied timeout.
    #[error("Provider request timed out after {0}ms")]
    Timeout(u64),

    /// The provider answered, but the response could not be parsed.
    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}
