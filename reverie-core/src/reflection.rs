//! Reflection — periodic synthesis of raw memories into insights.
//!
//! Each character accrues an importance accumulator as memories arrive.
//! Once it crosses the configured threshold, the reflection pipeline
//! runs: recent memories are distilled into a few salient questions, the
//! questions drive retrieval for supporting context, and a language
//! model turns the lot into first-person insights that are stored back
//! as high-importance, decay-exempt memories.
//!
//! The accumulator is reset *before* the pipeline runs, so a failure
//! mid-pipeline cannot retrigger reflection on every subsequent memory.
//! Every model failure degrades to an empty result; reflection is an
//! enrichment, never a required step.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::ReflectionConfig;
use crate::error::Result;
use crate::provider::LanguageModel;
use crate::registry::MemoryRegistry;
use crate::types::{CharacterId, MemoryCategory, Timestamp};

/// How many recent memories are rendered into the question prompt.
const STATEMENT_COUNT: usize = 50;
/// Retrieval depth per generated question.
const PER_QUESTION_TOP_K: usize = 5;
/// How much of the recent window goes into the insight context.
const CONTEXT_RECENT: usize = 30;
/// How many question-retrieved extras join the insight context.
const CONTEXT_EXTRA: usize = 20;

/// Per-character reflection scheduling and pipeline.
pub struct ReflectionEngine {
    accumulators: DashMap<CharacterId, f64>,
    model: Arc<dyn LanguageModel>,
    config: ReflectionConfig,
}

impl ReflectionEngine {
    /// Create a reflection engine backed by the given language model.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, config: ReflectionConfig) -> Self {
        Self {
            accumulators: DashMap::new(),
            model,
            config,
        }
    }

    /// Add a memory's importance to a character's accumulator and return
    /// the new total.
    pub fn accumulate_importance(&self, character: &CharacterId, importance: f32) -> f64 {
        let mut entry = self.accumulators.entry(character.clone()).or_insert(0.0);
        *entry += f64::from(importance);
        *entry
    }

    /// Whether a character's accumulator has crossed the reflection
    /// threshold.
    #[must_use]
    pub fn threshold_reached(&self, character: &CharacterId) -> bool {
        self.accumulators
            .get(character)
            .is_some_and(|total| *total >= self.config.importance_threshold)
    }

    /// Reset a character's accumulator to zero.
    pub fn reset_accumulator(&self, character: &CharacterId) {
        self.accumulators.insert(character.clone(), 0.0);
    }

    /// Current accumulator value (0 if none).
    #[must_use]
    pub fn accumulated(&self, character: &CharacterId) -> f64 {
        self.accumulators.get(character).map_or(0.0, |v| *v)
    }

    /// Run the full reflection pipeline for one character.
    ///
    /// Resets the accumulator up front, then: recent memories → salient
    /// questions → per-question retrieval → insight synthesis → insights
    /// stored as decay-exempt [`MemoryCategory::Reflection`] memories.
    /// Returns the stored insights; any model failure yields an empty
    /// list.
    ///
    /// # Errors
    /// Returns [`crate::error::EngineError::CharacterNotFound`] if the
    /// character is not registered.
    pub async fn generate_reflections(
        &self,
        registry: &MemoryRegistry,
        character: &CharacterId,
        character_name: &str,
    ) -> Result<Vec<String>> {
        self.reset_accumulator(character);

        let recent = registry.retrieve_recent(character, self.config.recent_memory_count).await?;
        if recent.is_empty() {
            debug!(character = %character, "No memories to reflect on");
            return Ok(Vec::new());
        }
        let recent_texts: Vec<String> = recent.into_iter().map(|r| r.text).collect();

        let statements: String = recent_texts
            .iter()
            .take(STATEMENT_COUNT)
            .enumerate()
            .map(|(i, text)| format!("{}. {text}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let questions = match self.model.generate_questions(character_name, &statements).await {
            Ok(q) if !q.is_empty() => q,
            Ok(_) => {
                debug!(character = %character, "Model produced no reflection questions");
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!(character = %character, error = %e, "Question generation failed — skipping reflection");
                return Ok(Vec::new());
            }
        };

        // Pull supporting memories per question, skipping anything the
        // recent window already covers.
        let seen: HashSet<&str> = recent_texts.iter().map(String::as_str).collect();
        let mut extra: Vec<String> = Vec::new();
        for question in &questions {
            let results = registry.retrieve(character, question, Some(PER_QUESTION_TOP_K)).await?;
            for hit in results {
                if !seen.contains(hit.text.as_str()) && !extra.contains(&hit.text) {
                    extra.push(hit.text);
                }
            }
        }

        let context: String = recent_texts
            .iter()
            .take(CONTEXT_RECENT)
            .chain(extra.iter().take(CONTEXT_EXTRA))
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        let insights = match self.model.generate_insights(character_name, &questions, &context).await
        {
            Ok(i) => i,
            Err(e) => {
                warn!(character = %character, error = %e, "Insight generation failed — skipping reflection");
                return Ok(Vec::new());
            }
        };

        let now = Timestamp::now();
        let importance = f32::from(self.config.default_importance);
        for insight in &insights {
            registry
                .insert_rated(character, insight, MemoryCategory::Reflection, importance, now)
                .await?;
        }

        info!(
            character = %character,
            questions = questions.len(),
            insights = insights.len(),
            "Reflection pipeline completed"
        );
        Ok(insights)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
