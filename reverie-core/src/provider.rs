//! External provider abstractions — embeddings and language-model calls.
//!
//! The engine never talks to a model directly: it is handed trait objects
//! at construction (no hidden module-level singletons). The real
//! HTTP-backed implementations live in the `reverie-llm` crate; this
//! module ships deterministic in-process implementations for tests and
//! offline operation.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// These are the engine's only suspension points besides language-model
/// calls; implementations must enforce their own request timeouts so
/// callers can degrade instead of hanging.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] if the provider is unavailable, times
    /// out, or returns an unparseable response.
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError>;

    /// Embed a batch of texts.
    ///
    /// Default implementation calls [`Self::embed`] in a loop; providers
    /// with a native batch API should override it.
    ///
    /// # Errors
    /// Returns an error if any embedding in the batch fails.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

/// Language-model calls the engine depends on.
///
/// All methods are stateless request/response and safe to retry. Every
/// call site in the engine has a documented fallback, so implementations
/// should return errors rather than block indefinitely.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Rate the importance of a memory on a 1–10 scale
    /// (1 = mundane, 10 = extraordinary).
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on failure; the engine falls back to
    /// the configured default rating.
    async fn rate_importance(&self, text: &str) -> Result<u8, ProviderError>;

    /// Consolidate a cluster of related memories into one first-person
    /// paragraph.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on failure; the cluster is skipped.
    async fn summarize(&self, texts: &[String]) -> Result<String, ProviderError>;

    /// Produce exactly 3 salient high-level questions about a character's
    /// recent memories.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on failure; the reflection pipeline
    /// ends with an empty result.
    async fn generate_questions(
        &self,
        character_name: &str,
        statements: &str,
    ) -> Result<Vec<String>, ProviderError>;

    /// Synthesize exactly 3 first-person insight reflections from the
    /// given questions and memory context.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] on failure; the reflection pipeline
    /// ends with an empty result.
    async fn generate_insights(
        &self,
        character_name: &str,
        questions: &[String],
        context: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Deterministic hash-based embedder (tests & offline use)
// ---------------------------------------------------------------------------

/// An embedding provider that derives a unit vector from a hash of the
/// text. Identical texts always map to identical vectors; unrelated texts
/// map to effectively uncorrelated vectors.
///
/// Used by tests and by deployments that want retrieval to work (exact
/// and near-exact matches) without an embedding service.
pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    /// Create a new hash-based provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        // FNV-1a seed, then a splitmix-style generator per component.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x100_0000_01b3);
        }
        let mut state = seed;
        let raw: Vec<f32> = (0..self.dims)
            .map(|_| {
                state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
                let mut z = state;
                z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
                z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
                z ^= z >> 31;
                // Map to [-1, 1).
                (z as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0
            })
            .collect();
        Ok(Embedding(raw).l2_normalized())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hash-unit-vector"
    }
}

// ---------------------------------------------------------------------------
// Null language model
// ---------------------------------------------------------------------------

/// A language model that is always unavailable.
///
/// Every engine call site degrades to its documented default, so running
/// with `NullLanguageModel` exercises the full fallback path: importance
/// defaults, no consolidation summaries, empty reflections.
pub struct NullLanguageModel;

#[async_trait]
impl LanguageModel for NullLanguageModel {
    async fn rate_importance(&self, _text: &str) -> Result<u8, ProviderError> {
        Err(ProviderError::Unavailable("no language model configured".into()))
    }

    async fn summarize(&self, _texts: &[String]) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable("no language model configured".into()))
    }

    async fn generate_questions(
        &self,
        _character_name: &str,
        _statements: &str,
    ) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Unavailable("no language model configured".into()))
    }

    async fn generate_insights(
        &self,
        _character_name: &str,
        _questions: &[String],
        _context: &str,
    ) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Unavailable("no language model configured".into()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
