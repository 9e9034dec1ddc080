//! Core type definitions for the REVERIE memory engine.
//!
//! All persisted types are serializable; identifiers are newtypes so the
//! compiler keeps character ids, memory ids, and raw strings apart.

use chrono::{DateTime, Duration, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Unique identifier for a simulated character.
///
/// Characters are keyed by name-like strings (the canonical relationship
/// pair key sorts these lexicographically).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub String);

impl CharacterId {
    /// Create a character id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Wall-clock timestamp (UTC) attached to memories and interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Seconds elapsed since `other`. Never negative.
    #[must_use]
    pub fn seconds_since(&self, other: &Self) -> f64 {
        let delta = self.0.signed_duration_since(other.0);
        (delta.num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Days elapsed since `other`. Never negative.
    #[must_use]
    pub fn days_since(&self, other: &Self) -> f64 {
        self.seconds_since(other) / 86_400.0
    }

    /// This timestamp shifted backwards by `seconds` (test/maintenance helper).
    #[must_use]
    pub fn minus_seconds(&self, seconds: i64) -> Self {
        Self(self.0 - Duration::seconds(seconds))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Memory categories
// ---------------------------------------------------------------------------

/// What kind of experience a memory records.
///
/// Reflections and consolidated summaries are exempt from decay and
/// pruning — they represent distilled knowledge, not raw experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Something the character saw or noticed.
    Observation,
    /// A conversation the character took part in.
    Conversation,
    /// The character moved somewhere.
    Movement,
    /// A direct interaction with another character.
    Interaction,
    /// A progress update on an ongoing action.
    ActionUpdate,
    /// A plan the character made.
    Plan,
    /// A response the character produced.
    AgentResponse,
    /// A high-level insight produced by the reflection engine.
    Reflection,
    /// A summary produced by memory consolidation.
    Consolidated,
}

impl MemoryCategory {
    /// Whether memories of this category are exempt from decay and pruning.
    #[must_use]
    pub fn is_decay_exempt(self) -> bool {
        matches!(self, Self::Reflection | Self::Consolidated)
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Observation => "observation",
            Self::Conversation => "conversation",
            Self::Movement => "movement",
            Self::Interaction => "interaction",
            Self::ActionUpdate => "action_update",
            Self::Plan => "plan",
            Self::AgentResponse => "agent_response",
            Self::Reflection => "reflection",
            Self::Consolidated => "consolidated",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Embedding vector
// ---------------------------------------------------------------------------

/// A dense vector embedding used for semantic similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings.
    ///
    /// Returns 0.0 for mismatched dimensions or zero-magnitude vectors.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON { 0.0 } else { dot / denom }
    }

    /// A unit-length copy of this embedding (zero vectors stay zero).
    #[must_use]
    pub fn l2_normalized(&self) -> Self {
        let mag: f32 = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return self.clone();
        }
        Self(self.0.iter().map(|x| x / mag).collect())
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Retrieval score
// ---------------------------------------------------------------------------

/// Composite score used to rank memories during retrieval.
///
/// Wraps `OrderedFloat` so scores are totally ordered and sortable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Create a retrieval score from a raw f64.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let a = Embedding(vec![1.0, 0.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_dimensions() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn l2_normalization_produces_unit_vector() {
        let e = Embedding(vec![3.0, 4.0]).l2_normalized();
        let mag: f32 = e.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_normalization_is_stable() {
        let e = Embedding(vec![0.0, 0.0]).l2_normalized();
        assert_eq!(e.0, vec![0.0, 0.0]);
    }

    #[test]
    fn reflection_and_consolidated_are_exempt() {
        assert!(MemoryCategory::Reflection.is_decay_exempt());
        assert!(MemoryCategory::Consolidated.is_decay_exempt());
        assert!(!MemoryCategory::Observation.is_decay_exempt());
        assert!(!MemoryCategory::Conversation.is_decay_exempt());
    }

    #[test]
    fn timestamp_age_is_never_negative() {
        let now = Timestamp::now();
        let earlier = now.minus_seconds(60);
        assert!(earlier.seconds_since(&now).abs() < f64::EPSILON);
        assert!((now.seconds_since(&earlier) - 60.0).abs() < 0.5);
    }

    #[test]
    fn retrieval_scores_sort_totally() {
        let mut scores = vec![
            RetrievalScore::new(0.2),
            RetrievalScore::new(f64::NAN),
            RetrievalScore::new(0.9),
        ];
        scores.sort();
        assert!((scores[0].value() - 0.2).abs() < 1e-12);
        assert!((scores[1].value() - 0.9).abs() < 1e-12);
        assert!(scores[2].value().is_nan(), "NaN must sort last, not panic");
    }

    #[test]
    fn category_serde_uses_snake_case() {
        let json = serde_json::to_string(&MemoryCategory::ActionUpdate).expect("serialize");
        assert_eq!(json, "\"action_update\"");
        let back: MemoryCategory = serde_json::from_str("\"consolidated\"").expect("deserialize");
        assert_eq!(back, MemoryCategory::Consolidated);
    }
}
