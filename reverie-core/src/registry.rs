//! Character registry — the shared front door to every memory index.
//!
//! The registry owns one [`MemoryIndex`] per registered character, each
//! behind its own async mutex so concurrent characters never contend
//! with each other. It also drives the persistence cadence: indexes are
//! flushed every `persist_every` inserts and after maintenance, and a
//! flush failure is logged rather than propagated — losing a save beat
//! must not break a running world.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::memory::{MaintenanceStats, MemoryIndex, MemoryRecord, RetrievedMemory};
use crate::persistence::PersistenceEngine;
use crate::provider::{EmbeddingProvider, LanguageModel};
use crate::types::{CharacterId, MemoryCategory, Timestamp};

/// Registry of per-character memory indexes.
pub struct MemoryRegistry {
    indexes: DashMap<CharacterId, Arc<Mutex<MemoryIndex>>>,
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
    persistence: Arc<PersistenceEngine>,
    config: Arc<EngineConfig>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
        persistence: Arc<PersistenceEngine>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            indexes: DashMap::new(),
            embedder,
            model,
            persistence,
            config,
        }
    }

    /// Load every previously saved index from the database. Corrupt rows
    /// were already skipped at the persistence layer. Returns the number
    /// of characters restored.
    ///
    /// # Errors
    /// Returns [`EngineError::Database`] if the bulk load itself fails.
    pub fn initialize(&self) -> Result<usize> {
        let saved = self.persistence.load_all_indexes()?;
        let count = saved.len();
        for (character, records) in saved {
            let index = MemoryIndex::from_records(
                character.clone(),
                records,
                Arc::clone(&self.embedder),
                Arc::clone(&self.model),
                Arc::clone(&self.config),
            );
            self.indexes.insert(character, Arc::new(Mutex::new(index)));
        }
        info!(characters = count, "Memory registry initialized from save");
        Ok(count)
    }

    /// Register a character, creating an empty index if they have none.
    pub fn register_character(&self, character: &CharacterId) {
        self.indexes.entry(character.clone()).or_insert_with(|| {
            info!(character = %character, "Registered new character");
            Arc::new(Mutex::new(MemoryIndex::new(
                character.clone(),
                Arc::clone(&self.embedder),
                Arc::clone(&self.model),
                Arc::clone(&self.config),
            )))
        });
    }

    /// Whether a character has an index.
    #[must_use]
    pub fn is_registered(&self, character: &CharacterId) -> bool {
        self.indexes.contains_key(character)
    }

    /// All registered characters.
    #[must_use]
    pub fn characters(&self) -> Vec<CharacterId> {
        self.indexes.iter().map(|e| e.key().clone()).collect()
    }

    fn index_for(&self, character: &CharacterId) -> Result<Arc<Mutex<MemoryIndex>>> {
        self.indexes
            .get(character)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::CharacterNotFound(character.clone()))
    }

    // ------------------------------------------------------------------
    // Memory operations
    // ------------------------------------------------------------------

    /// Record a memory for a character at the current time.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered.
    pub async fn add_memory(
        &self,
        character: &CharacterId,
        text: &str,
        category: MemoryCategory,
    ) -> Result<f32> {
        self.add_memory_at(character, text, category, Timestamp::now()).await
    }

    /// Record a memory at an explicit time. Every `persist_every` inserts
    /// the index is flushed and, if it sits above the memory cap, a
    /// maintenance pass runs. Returns the assigned importance.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered. Provider and persistence failures degrade internally
    /// and never surface here.
    pub async fn add_memory_at(
        &self,
        character: &CharacterId,
        text: &str,
        category: MemoryCategory,
        now: Timestamp,
    ) -> Result<f32> {
        let lock = self.index_for(character)?;
        let mut index = lock.lock().await;

        let importance = index.add_memory(text, category, now).await;

        // The cap check rides the persistence beat: an index stuck above
        // the cap is revisited every `persist_every` inserts, not on each.
        let persist_every = self.config.memory.persist_every.max(1);
        if index.insert_count() % persist_every == 0 {
            self.flush(&index);

            if index.len() > self.config.memory.max_per_character {
                let stats = index.maintain(now).await;
                info!(
                    character = %character,
                    before = stats.memories_before,
                    after = stats.memories_after,
                    pruned = stats.pruned,
                    consolidated = stats.consolidated_reduction,
                    "Over-cap maintenance pass"
                );
                self.flush(&index);
            }
        }

        Ok(importance)
    }

    /// Store a memory with a caller-decided importance, bypassing the
    /// rating call. Used by the reflection pipeline.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered.
    pub async fn insert_rated(
        &self,
        character: &CharacterId,
        text: &str,
        category: MemoryCategory,
        importance: f32,
        now: Timestamp,
    ) -> Result<()> {
        let lock = self.index_for(character)?;
        let mut index = lock.lock().await;
        index.insert_with_importance(text, category, importance, now).await;
        Ok(())
    }

    /// Retrieve a character's most relevant memories for a query.
    /// `top_k` of `None` uses the configured `retrieval.top_k`.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered.
    pub async fn retrieve(
        &self,
        character: &CharacterId,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedMemory>> {
        let lock = self.index_for(character)?;
        let index = lock.lock().await;
        Ok(index.retrieve(query, top_k, Timestamp::now()).await)
    }

    /// A character's most recent memories, newest first.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered.
    pub async fn retrieve_recent(
        &self,
        character: &CharacterId,
        count: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let lock = self.index_for(character)?;
        let index = lock.lock().await;
        Ok(index.retrieve_recent(count))
    }

    /// Number of memories a character currently holds.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered.
    pub async fn memory_count(&self, character: &CharacterId) -> Result<usize> {
        let lock = self.index_for(character)?;
        let index = lock.lock().await;
        Ok(index.len())
    }

    // ------------------------------------------------------------------
    // Maintenance & persistence
    // ------------------------------------------------------------------

    /// Run decay, pruning and consolidation for every character, flushing
    /// each index afterwards.
    pub async fn run_maintenance(&self, now: Timestamp) -> Vec<MaintenanceStats> {
        let mut all_stats = Vec::new();
        for lock in self.all_indexes() {
            let mut index = lock.lock().await;
            let stats = index.maintain(now).await;
            self.flush(&index);
            all_stats.push(stats);
        }
        all_stats
    }

    /// Flush one character's index to the database.
    ///
    /// # Errors
    /// Returns [`EngineError::CharacterNotFound`] if the character is not
    /// registered, or a persistence error if the save fails.
    pub async fn persist(&self, character: &CharacterId) -> Result<()> {
        let lock = self.index_for(character)?;
        let index = lock.lock().await;
        self.persistence.save_index(index.character(), index.records())
    }

    /// Flush every index. Returns how many saved cleanly; failures are
    /// logged per character.
    pub async fn persist_all(&self) -> usize {
        let mut saved = 0;
        for lock in self.all_indexes() {
            let index = lock.lock().await;
            match self.persistence.save_index(index.character(), index.records()) {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!(character = %index.character(), error = %e, "Failed to persist memory index");
                }
            }
        }
        saved
    }

    fn all_indexes(&self) -> Vec<Arc<Mutex<MemoryIndex>>> {
        self.indexes.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Best-effort save while the index lock is held.
    fn flush(&self, index: &MemoryIndex) {
        if let Err(e) = self.persistence.save_index(index.character(), index.records()) {
            warn!(character = %index.character(), error = %e, "Failed to persist memory index");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
