//! Per-character memory index — storage, retrieval, decay, consolidation.
//!
//! Every character owns one [`MemoryIndex`]: an append-mostly store of
//! [`MemoryRecord`]s with composite-score retrieval (relevance + recency
//! + importance), linear importance decay with pruning, and
//! similarity-clustered consolidation to bound storage.

pub mod consolidation;
pub mod decay;
pub mod scoring;

use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::provider::{EmbeddingProvider, LanguageModel};
use crate::types::{
    CharacterId, Embedding, MemoryCategory, MemoryId, RetrievalScore, Timestamp,
};

// ---------------------------------------------------------------------------
// MemoryRecord
// ---------------------------------------------------------------------------

/// A single memory owned by one character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier for this memory.
    pub id: MemoryId,
    /// Natural-language content of the memory.
    pub text: String,
    /// Vector embedding for similarity retrieval. `None` when the
    /// embedding provider was unavailable at creation time; such records
    /// are invisible to similarity search but still listed chronologically.
    pub embedding: Option<Embedding>,
    /// When the memory was formed.
    pub created_at: Timestamp,
    /// Watermark of the last decay pass applied to this record.
    pub last_decay: Timestamp,
    /// Current importance, 0.0–10.0. Starts as an integer rating and is
    /// mutated downward by decay.
    pub importance: f32,
    /// What kind of experience this records.
    pub category: MemoryCategory,
}

impl MemoryRecord {
    /// Create a new record. Importance is clamped to [0, 10].
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        embedding: Option<Embedding>,
        importance: f32,
        category: MemoryCategory,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: MemoryId::new(),
            text: text.into(),
            embedding,
            created_at,
            last_decay: created_at,
            importance: importance.clamp(0.0, 10.0),
            category,
        }
    }
}

/// A retrieval result: memory text plus its composite score.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    /// The memory's text.
    pub text: String,
    /// Composite score (α·relevance + β·recency + γ·importance).
    pub score: f64,
}

/// Before/after counts from a maintenance pass.
#[derive(Debug, Clone)]
pub struct MaintenanceStats {
    /// The character whose index was maintained.
    pub character: CharacterId,
    /// Memory count before the pass.
    pub memories_before: usize,
    /// Memory count after the pass.
    pub memories_after: usize,
    /// How many memories were pruned by decay.
    pub pruned: usize,
    /// Net reduction achieved by consolidation.
    pub consolidated_reduction: usize,
}

// ---------------------------------------------------------------------------
// MemoryIndex
// ---------------------------------------------------------------------------

/// One character's memory store.
///
/// Writes are expected from a single logical owner (the character's
/// decision loop); the registry wraps each index in a lock so background
/// maintenance cannot interleave with inserts.
pub struct MemoryIndex {
    character: CharacterId,
    records: Vec<MemoryRecord>,
    insert_count: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
    config: Arc<EngineConfig>,
}

impl MemoryIndex {
    /// Create an empty index for a character.
    #[must_use]
    pub fn new(
        character: CharacterId,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            character,
            records: Vec::new(),
            insert_count: 0,
            embedder,
            model,
            config,
        }
    }

    /// Rebuild an index from previously persisted records.
    #[must_use]
    pub fn from_records(
        character: CharacterId,
        records: Vec<MemoryRecord>,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            character,
            records,
            insert_count: 0,
            embedder,
            model,
            config,
        }
    }

    /// The character this index belongs to.
    #[must_use]
    pub fn character(&self) -> &CharacterId {
        &self.character
    }

    /// Number of memories currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no memories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts since this index was created or loaded.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.insert_count
    }

    /// Borrow the raw records (persistence and tests).
    #[must_use]
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Record a new memory, rating its importance via the language model.
    ///
    /// Never fails: a provider failure falls back to the configured
    /// default rating, and an embedding failure stores the record without
    /// a vector. Returns the importance that was assigned.
    pub async fn add_memory(
        &mut self,
        text: &str,
        category: MemoryCategory,
        now: Timestamp,
    ) -> f32 {
        let importance = match self.model.rate_importance(text).await {
            Ok(rating) => f32::from(rating.clamp(1, 10)),
            Err(e) => {
                warn!(character = %self.character, error = %e, "Importance rating failed — using default");
                f32::from(self.config.memory.default_importance)
            }
        };
        self.insert_with_importance(text, category, importance, now).await;
        importance
    }

    /// Insert a memory with a pre-decided importance, bypassing the
    /// rating call. Used for reflections (fixed importance) and
    /// consolidated summaries (boosted importance).
    pub async fn insert_with_importance(
        &mut self,
        text: &str,
        category: MemoryCategory,
        importance: f32,
        now: Timestamp,
    ) {
        let embedding = match self.embedder.embed(text).await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(character = %self.character, error = %e, "Embedding failed — storing without vector");
                None
            }
        };
        self.records.push(MemoryRecord::new(text, embedding, importance, category, now));
        self.insert_count += 1;
        debug!(
            character = %self.character,
            category = %category,
            importance,
            total = self.records.len(),
            "Memory stored"
        );
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    /// Retrieve the top-K memories for a query, re-ranked by composite
    /// score. `top_k` of `None` uses the configured `retrieval.top_k`.
    ///
    /// Fetches `top_k × candidate_multiplier` nearest neighbors by raw
    /// cosine similarity, then re-ranks by
    /// α·relevance + β·recency + γ·importance and returns the top `top_k`
    /// in descending score order. Ties keep insertion order (stable sort).
    ///
    /// Returns an empty list if the query cannot be embedded.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        now: Timestamp,
    ) -> Vec<RetrievedMemory> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        let query_embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!(character = %self.character, error = %e, "Query embedding failed — empty retrieval");
                return Vec::new();
            }
        };

        // Similarity pass over every embedded record, in insertion order.
        let mut candidates: Vec<(&MemoryRecord, f64)> = self
            .records
            .iter()
            .filter_map(|record| {
                let embedding = record.embedding.as_ref()?;
                let sim = f64::from(query_embedding.cosine_similarity(embedding).max(0.0));
                Some((record, sim))
            })
            .collect();

        candidates.sort_by_key(|&(_, sim)| Reverse(RetrievalScore::new(sim)));
        candidates.truncate(top_k * self.config.retrieval.candidate_multiplier.max(1));

        // Composite re-rank: pure similarity ignores staleness and salience.
        let mut scored: Vec<RetrievedMemory> = candidates
            .into_iter()
            .map(|(record, relevance)| RetrievedMemory {
                text: record.text.clone(),
                score: scoring::composite_score(
                    relevance,
                    &record.created_at,
                    record.importance,
                    &now,
                    &self.config.retrieval,
                ),
            })
            .collect();

        scored.sort_by_key(|m| Reverse(RetrievalScore::new(m.score)));
        scored.truncate(top_k);
        scored
    }

    /// List the `count` most recent memories, newest first.
    ///
    /// The in-memory index has native time ordering, so this is an exact
    /// chronological scan (not the similarity-query approximation a pure
    /// vector store would need).
    #[must_use]
    pub fn retrieve_recent(&self, count: usize) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(count);
        records
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Decay importance on all non-exempt memories and prune those below
    /// the threshold. Returns the number pruned.
    pub fn decay_and_prune(&mut self, now: Timestamp) -> usize {
        let pruned = decay::decay_and_prune(&mut self.records, &now, &self.config.memory);
        debug!(character = %self.character, pruned, remaining = self.records.len(), "Decay/prune pass");
        pruned
    }

    /// Consolidate similar long-term memories into summaries.
    ///
    /// No-op unless the memory count exceeds the configured cap. The most
    /// recent `short_term_buffer` memories are untouched; the remainder
    /// are clustered greedily by embedding similarity, and each accepted
    /// cluster is replaced by a single summarized memory with boosted
    /// importance. Returns the net reduction in memory count.
    pub async fn consolidate(&mut self, now: Timestamp) -> usize {
        let memory = &self.config.memory;
        if self.records.len() <= memory.max_per_character {
            return 0;
        }

        // Partition by recency: short-term buffer stays untouched.
        let mut by_recency: Vec<usize> = (0..self.records.len()).collect();
        by_recency.sort_by(|&a, &b| self.records[b].created_at.cmp(&self.records[a].created_at));
        let long_term: Vec<usize> = by_recency.into_iter().skip(memory.short_term_buffer).collect();

        if long_term.len() < memory.cluster_min_size {
            return 0;
        }

        let texts: Vec<String> = long_term.iter().map(|&i| self.records[i].text.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(e) => e,
            Err(e) => {
                warn!(character = %self.character, error = %e, "Batch embedding failed — skipping consolidation");
                return 0;
            }
        };
        let normalized: Vec<Embedding> = embeddings.iter().map(Embedding::l2_normalized).collect();

        let clusters = consolidation::greedy_clusters(
            &normalized,
            memory.similarity_threshold,
            memory.cluster_min_size,
        );

        let consolidated_importance = f32::from(memory.default_importance) + 1.0;
        // Record ids up front: positions shift as clusters are replaced.
        let long_term_ids: Vec<MemoryId> = long_term.iter().map(|&i| self.records[i].id).collect();
        let mut reduced = 0_usize;
        let mut cluster_count = 0_usize;

        for cluster in &clusters {
            let cluster_texts: Vec<String> = cluster.iter().map(|&i| texts[i].clone()).collect();
            let summary = match self.model.summarize(&cluster_texts).await {
                Ok(s) if !s.trim().is_empty() => s,
                Ok(_) => continue,
                Err(e) => {
                    warn!(character = %self.character, error = %e, "Cluster summarization failed — skipping cluster");
                    continue;
                }
            };

            let member_ids: Vec<MemoryId> = cluster.iter().map(|&i| long_term_ids[i]).collect();
            self.records.retain(|r| !member_ids.contains(&r.id));
            self.insert_with_importance(
                &summary,
                MemoryCategory::Consolidated,
                consolidated_importance,
                now,
            )
            .await;

            reduced += cluster.len() - 1;
            cluster_count += 1;
        }

        debug!(
            character = %self.character,
            clusters = cluster_count,
            reduced,
            "Consolidation pass"
        );
        reduced
    }

    /// Combined decay + consolidation pass with before/after counts.
    /// Persistence is handled by the registry.
    pub async fn maintain(&mut self, now: Timestamp) -> MaintenanceStats {
        let memories_before = self.records.len();
        let pruned = self.decay_and_prune(now);
        let consolidated_reduction = self.consolidate(now).await;
        MaintenanceStats {
            character: self.character.clone(),
            memories_before,
            memories_after: self.records.len(),
            pruned,
            consolidated_reduction,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{HashEmbeddingProvider, NullLanguageModel};
    use async_trait::async_trait;

    /// A language model with fixed answers, for exercising the index
    /// without a network.
    struct FixedModel {
        importance: u8,
    }

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn rate_importance(&self, _text: &str) -> Result<u8, ProviderError> {
            Ok(self.importance)
        }

        async fn summarize(&self, texts: &[String]) -> Result<String, ProviderError> {
            Ok(format!("Taken together: {} related moments.", texts.len()))
        }

        async fn generate_questions(
            &self,
            _character_name: &str,
            _statements: &str,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["?".into(), "?".into(), "?".into()])
        }

        async fn generate_insights(
            &self,
            _character_name: &str,
            _questions: &[String],
            _context: &str,
        ) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["insight".into()])
        }
    }

    fn index_with(model: Arc<dyn LanguageModel>, config: EngineConfig) -> MemoryIndex {
        MemoryIndex::new(
            CharacterId::from("ada"),
            Arc::new(HashEmbeddingProvider::new(32)),
            model,
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn add_memory_returns_model_rating() {
        let mut index = index_with(Arc::new(FixedModel { importance: 7 }), EngineConfig::default());
        let importance = index
            .add_memory("a fire broke out at the mill", MemoryCategory::Observation, Timestamp::now())
            .await;
        assert!((importance - 7.0).abs() < 1e-6);
        assert_eq!(index.len(), 1);
        assert_eq!(index.insert_count(), 1);
    }

    #[tokio::test]
    async fn add_memory_defaults_when_model_unavailable() {
        let mut index = index_with(Arc::new(NullLanguageModel), EngineConfig::default());
        let importance = index
            .add_memory("ate breakfast", MemoryCategory::Observation, Timestamp::now())
            .await;
        assert!((importance - 5.0).abs() < 1e-6, "provider failure must never fail the caller");
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn retrieve_returns_at_most_k_sorted_descending() {
        let mut index = index_with(Arc::new(FixedModel { importance: 5 }), EngineConfig::default());
        let now = Timestamp::now();
        for i in 0..20 {
            index
                .add_memory(&format!("event number {i}"), MemoryCategory::Observation, now)
                .await;
        }

        let results = index.retrieve("event number 3", Some(5), now).await;
        assert!(results.len() <= 5);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score, "results must be non-increasing");
        }
        // The exact-match text embeds identically, so it must surface.
        assert_eq!(results[0].text, "event number 3");
    }

    #[tokio::test]
    async fn retrieve_defaults_to_configured_top_k() {
        let mut config = EngineConfig::default();
        config.retrieval.top_k = 2;
        let mut index = index_with(Arc::new(FixedModel { importance: 5 }), config);
        let now = Timestamp::now();
        for i in 0..6 {
            index
                .add_memory(&format!("chore number {i}"), MemoryCategory::Observation, now)
                .await;
        }

        let results = index.retrieve("chore number 1", None, now).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn retrieve_recent_is_newest_first() {
        let mut index = index_with(Arc::new(FixedModel { importance: 5 }), EngineConfig::default());
        let now = Timestamp::now();
        index
            .add_memory("oldest", MemoryCategory::Observation, now.minus_seconds(300))
            .await;
        index
            .add_memory("middle", MemoryCategory::Observation, now.minus_seconds(200))
            .await;
        index.add_memory("newest", MemoryCategory::Observation, now).await;

        let recent = index.retrieve_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "newest");
        assert_eq!(recent[1].text, "middle");
    }

    #[tokio::test]
    async fn consolidate_is_noop_below_cap() {
        let mut index = index_with(Arc::new(FixedModel { importance: 5 }), EngineConfig::default());
        let now = Timestamp::now();
        for i in 0..10 {
            index
                .add_memory(&format!("minor event {i}"), MemoryCategory::Observation, now)
                .await;
        }
        assert_eq!(index.consolidate(now).await, 0);
        assert_eq!(index.len(), 10);
    }

    #[tokio::test]
    async fn records_without_embeddings_still_appear_chronologically() {
        // NullLanguageModel + a failing embedder: record is stored bare.
        struct FailingEmbedder;

        #[async_trait]
        impl EmbeddingProvider for FailingEmbedder {
            async fn embed(&self, _text: &str) -> Result<Embedding, ProviderError> {
                Err(ProviderError::Unavailable("down".into()))
            }
            fn dimensions(&self) -> usize {
                0
            }
            fn model_name(&self) -> &str {
                "failing"
            }
        }

        let mut index = MemoryIndex::new(
            CharacterId::from("ada"),
            Arc::new(FailingEmbedder),
            Arc::new(NullLanguageModel),
            Arc::new(EngineConfig::default()),
        );
        let now = Timestamp::now();
        index.add_memory("unembedded moment", MemoryCategory::Observation, now).await;

        assert!(index.retrieve("anything", None, now).await.is_empty());
        let recent = index.retrieve_recent(5);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "unembedded moment");
    }
}
