//! HTTP-backed LLM client for Ollama and OpenAI-compatible backends.
//!
//! One [`LlmClient`] implements both of the engine's provider traits:
//! [`LanguageModel`] over the chat endpoint, [`EmbeddingProvider`] over
//! the embeddings endpoint. Model responses are plain text or small JSON
//! arrays; the parse helpers below tolerate the usual model quirks
//! (code fences, prose around the JSON, `7/10`-style ratings).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use reverie_core::provider::{EmbeddingProvider, LanguageModel};
use reverie_core::{Embedding, ProviderError};

use crate::error::LlmError;
use crate::prompt::{
    render_template, CONSOLIDATION_SYSTEM, CONSOLIDATION_USER, IMPORTANCE_SYSTEM, IMPORTANCE_USER,
    INSIGHTS_SYSTEM, INSIGHTS_USER, QUESTIONS_SYSTEM, QUESTIONS_USER,
};
use crate::types::{LlmRequest, LlmResponse, LlmSettings};

/// Provider backend for inference and embeddings.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Base URL, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// Base URL, e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend — every call errors, and the engine degrades to its
    /// documented defaults.
    None,
}

/// Client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    chat_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    max_retries: u32,
    timeout_ms: u64,
}

impl LlmClient {
    /// Build a client from settings.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] for an unknown provider kind or
    /// a missing API key.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let provider = match settings.provider.as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: settings.base_url.clone(),
            },
            "openai" => {
                if settings.api_key.is_empty() {
                    return Err(LlmError::ConfigError(
                        "openai provider requires an api_key".into(),
                    ));
                }
                LlmProvider::OpenAiCompatible {
                    base_url: settings.base_url.clone(),
                    api_key: settings.api_key.clone(),
                }
            }
            "none" => LlmProvider::None,
            other => {
                return Err(LlmError::ConfigError(format!("unknown provider: '{other}'")));
            }
        };

        Ok(Self {
            provider,
            http: Client::new(),
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            embedding_dimensions: settings.embedding_dimensions,
            max_retries: settings.max_retries,
            timeout_ms: settings.timeout_ms,
        })
    }

    /// A client with no backend configured.
    #[must_use]
    pub fn none() -> Self {
        Self {
            provider: LlmProvider::None,
            http: Client::new(),
            chat_model: String::new(),
            embedding_model: String::new(),
            embedding_dimensions: 0,
            max_retries: 0,
            timeout_ms: 0,
        }
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate text from the backend.
    ///
    /// # Errors
    /// Returns an [`LlmError`] when no backend is configured, the
    /// request fails after all retries, or the response is malformed.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let (url, body, api_key) = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("no LLM provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => (
                format!("{base_url}/api/generate"),
                json!({
                    "model": self.chat_model,
                    "prompt": format!("{}\n\n{}", request.system, request.user),
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                }),
                None,
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                format!("{base_url}/v1/chat/completions"),
                json!({
                    "model": self.chat_model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                }),
                Some(api_key.as_str()),
            ),
        };

        let response = self.post_json(&url, &body, api_key, request.timeout_ms).await?;
        let text = match &self.provider {
            LlmProvider::Ollama { .. } => response["response"].as_str().unwrap_or("").to_string(),
            _ => response["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or("")
                .to_string(),
        };

        Ok(LlmResponse {
            text,
            latency_ms: start.elapsed().as_millis() as u64,
            model: self.chat_model.clone(),
        })
    }

    /// Embed a text through the backend's embedding endpoint.
    ///
    /// # Errors
    /// Returns an [`LlmError`] when no backend is configured, the
    /// request fails after all retries, or the response is malformed.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let (url, body, api_key, field) = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("no embedding provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => (
                format!("{base_url}/api/embeddings"),
                json!({ "model": self.embedding_model, "prompt": text }),
                None,
                "embedding",
            ),
            LlmProvider::OpenAiCompatible { base_url, api_key } => (
                format!("{base_url}/v1/embeddings"),
                json!({ "model": self.embedding_model, "input": text }),
                Some(api_key.as_str()),
                "data",
            ),
        };

        let response = self.post_json(&url, &body, api_key, self.timeout_ms).await?;
        let values = if field == "embedding" {
            response["embedding"].as_array().cloned()
        } else {
            response["data"][0]["embedding"].as_array().cloned()
        };
        let values =
            values.ok_or_else(|| LlmError::ParseError("missing embedding in response".into()))?;

        let vector: Vec<f32> = values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect();
        if vector.len() != values.len() {
            return Err(LlmError::ParseError("non-numeric embedding component".into()));
        }
        Ok(vector)
    }

    /// POST a JSON body with the retry loop shared by every endpoint.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        api_key: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Value, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(url, attempt = attempt + 1, "Retrying LLM call");
            }

            let mut req = self.http.post(url).json(body).timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = api_key {
                req = req.header("Authorization", format!("Bearer {key}"));
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()));
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!(url, error = %last_error, "LLM backend returned error status");
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!(url, timeout_ms, "LLM request timed out");
                    }
                    last_error = e.to_string();
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

/// Strip a surrounding Markdown code fence, if present.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    match inner.split_once('\n') {
        Some((first, rest)) if !first.contains('[') && !first.contains('{') => rest.trim(),
        _ => inner.trim(),
    }
}

/// Parse a JSON array of strings out of model output, tolerating fences
/// and surrounding prose.
///
/// # Errors
/// Returns [`LlmError::ParseError`] if no JSON string array is found.
pub fn parse_string_list(text: &str) -> Result<Vec<String>, LlmError> {
    let cleaned = strip_code_fences(text);
    let start = cleaned
        .find('[')
        .ok_or_else(|| LlmError::ParseError(format!("no JSON array in: '{cleaned}'")))?;
    let end = cleaned
        .rfind(']')
        .ok_or_else(|| LlmError::ParseError(format!("unterminated JSON array in: '{cleaned}'")))?;
    if end < start {
        return Err(LlmError::ParseError(format!("malformed JSON array in: '{cleaned}'")));
    }
    serde_json::from_str(&cleaned[start..=end])
        .map_err(|e| LlmError::ParseError(format!("JSON parse error: {e}")))
}

/// Parse a 1–10 rating from model output. Accepts bare integers as well
/// as `7/10` or `Rating: 7`; out-of-range values are clamped.
///
/// # Errors
/// Returns [`LlmError::ParseError`] if the text contains no digits.
pub fn parse_rating(text: &str) -> Result<u8, LlmError> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    let value: u32 = digits
        .parse()
        .map_err(|_| LlmError::ParseError(format!("no rating in: '{text}'")))?;
    Ok(value.clamp(1, 10) as u8)
}

// ---------------------------------------------------------------------------
// Provider trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl LanguageModel for LlmClient {
    async fn rate_importance(&self, text: &str) -> Result<u8, ProviderError> {
        let request = LlmRequest::new(
            IMPORTANCE_SYSTEM,
            render_template(IMPORTANCE_USER, &[("memory_text", text)]),
        )
        .with_temperature(0.0)
        .with_max_tokens(8)
        .with_timeout(self.timeout_ms);

        let response = self.generate(&request).await?;
        Ok(parse_rating(&response.text)?)
    }

    async fn summarize(&self, texts: &[String]) -> Result<String, ProviderError> {
        let memories: String = texts.iter().map(|t| format!("- {t}\n")).collect();
        let request = LlmRequest::new(
            CONSOLIDATION_SYSTEM,
            render_template(CONSOLIDATION_USER, &[("memories", memories.trim_end())]),
        )
        .with_timeout(self.timeout_ms);

        let response = self.generate(&request).await?;
        Ok(response.text.trim().to_string())
    }

    async fn generate_questions(
        &self,
        character_name: &str,
        statements: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let request = LlmRequest::new(
            QUESTIONS_SYSTEM,
            render_template(
                QUESTIONS_USER,
                &[("character_name", character_name), ("statements", statements)],
            ),
        )
        .with_timeout(self.timeout_ms);

        let response = self.generate(&request).await?;
        Ok(parse_string_list(&response.text)?)
    }

    async fn generate_insights(
        &self,
        character_name: &str,
        questions: &[String],
        context: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let question_block: String = questions.iter().map(|q| format!("- {q}\n")).collect();
        let request = LlmRequest::new(
            INSIGHTS_SYSTEM,
            render_template(
                INSIGHTS_USER,
                &[
                    ("character_name", character_name),
                    ("questions", question_block.trim_end()),
                    ("context", context),
                ],
            ),
        )
        .with_max_tokens(512)
        .with_timeout(self.timeout_ms);

        let response = self.generate(&request).await?;
        Ok(parse_string_list(&response.text)?)
    }
}

#[async_trait]
impl EmbeddingProvider for LlmClient {
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        let vector = self.embed_text(text).await?;
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
