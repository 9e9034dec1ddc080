//! Request/response types and backend configuration.

use serde::{Deserialize, Serialize};

/// A single text-generation request.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (role, rules, output format).
    pub system: String,
    /// User prompt (the content to act on).
    pub user: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// Create a request with the default budget (short structured output).
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 256,
            temperature: 0.7,
            timeout_ms: 10_000,
        }
    }

    /// Override the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the LLM backend.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model produced it.
    pub model: String,
}

/// Backend settings, loadable from the world config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Backend kind: `"ollama"`, `"openai"`, or `"none"`.
    pub provider: String,
    /// Base URL of the backend.
    pub base_url: String,
    /// API key for OpenAI-compatible backends.
    pub api_key: String,
    /// Chat/completion model name.
    pub chat_model: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Dimensionality of the embedding model's output.
    pub embedding_dimensions: usize,
    /// Retry attempts after the first failure.
    pub max_retries: u32,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: String::new(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            max_retries: 2,
            timeout_ms: 10_000,
        }
    }
}
