//! # reverie-llm — model backends for the REVERIE engine
//!
//! HTTP-backed implementations of the engine's provider traits:
//!   - **Ollama** (local, recommended default)
//!   - **OpenAI-compatible API**
//!
//! One [`LlmClient`] serves as both the [`reverie_core::LanguageModel`]
//! (importance rating, consolidation summaries, reflection questions and
//! insights) and the [`reverie_core::EmbeddingProvider`]. All calls carry
//! timeouts and a bounded retry loop; on exhaustion the engine's
//! documented fallbacks take over, so a dead backend degrades the
//! simulation instead of stopping it.

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use types::{LlmRequest, LlmResponse, LlmSettings};
