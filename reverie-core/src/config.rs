//! Configuration for the REVERIE engine.
//!
//! Every tunable the engine exposes lives here, loadable from TOML with
//! per-field serde defaults so partial config files work.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-character memory capacity, decay, and consolidation settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval scoring settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reflection trigger settings.
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Relationship graph settings.
    #[serde(default)]
    pub social: SocialConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::EngineError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Per-character memory capacity and maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Soft cap on memories per character; exceeding it triggers
    /// consolidation during maintenance.
    #[serde(default = "default_500")]
    pub max_per_character: usize,
    /// Importance rating used when the language model is unavailable.
    #[serde(default = "default_5_u8")]
    pub default_importance: u8,
    /// Fraction of importance lost per day of age (linear decay).
    #[serde(default = "default_0_02")]
    pub decay_rate_per_day: f32,
    /// Memories whose decayed importance falls below this are pruned.
    #[serde(default = "default_1_0")]
    pub prune_threshold: f32,
    /// Most recent N memories are never consolidated (short-term buffer).
    #[serde(default = "default_50")]
    pub short_term_buffer: usize,
    /// Minimum cluster size for consolidation to accept a cluster.
    #[serde(default = "default_5_usize")]
    pub cluster_min_size: usize,
    /// Cosine similarity to the cluster seed required for membership.
    #[serde(default = "default_0_85")]
    pub similarity_threshold: f32,
    /// Persist an index (and check the cap) every N inserts.
    #[serde(default = "default_50")]
    pub persist_every: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_per_character: 500,
            default_importance: 5,
            decay_rate_per_day: 0.02,
            prune_threshold: 1.0,
            short_term_buffer: 50,
            cluster_min_size: 5,
            similarity_threshold: 0.85,
            persist_every: 50,
        }
    }
}

/// Retrieval scoring weights and parameters.
///
/// The weights need not sum to 1.0; callers may retune them freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight for semantic relevance (raw similarity score).
    #[serde(default = "default_0_5")]
    pub relevance_weight: f64,
    /// Weight for recency (exponential half-life decay).
    #[serde(default = "default_0_3")]
    pub recency_weight: f64,
    /// Weight for importance (raw rating / 10).
    #[serde(default = "default_0_2")]
    pub importance_weight: f64,
    /// Recency half-life in hours.
    #[serde(default = "default_24_0")]
    pub half_life_hours: f64,
    /// Default number of results per query.
    #[serde(default = "default_5_usize")]
    pub top_k: usize,
    /// Over-fetch factor: `top_k × multiplier` candidates are fetched by
    /// similarity before composite re-ranking.
    #[serde(default = "default_3")]
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 0.5,
            recency_weight: 0.3,
            importance_weight: 0.2,
            half_life_hours: 24.0,
            top_k: 5,
            candidate_multiplier: 3,
        }
    }
}

/// Reflection engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Accumulated importance that triggers a reflection pass.
    #[serde(default = "default_150_0")]
    pub importance_threshold: f64,
    /// How many recent memories the pipeline starts from.
    #[serde(default = "default_100")]
    pub recent_memory_count: usize,
    /// Fixed importance assigned to stored reflections (bypasses rating).
    #[serde(default = "default_8")]
    pub default_importance: u8,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            importance_threshold: 150.0,
            recent_memory_count: 100,
            default_importance: 8,
        }
    }
}

/// Relationship graph settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    /// Lower bound of the strength domain (upper bound is always 1.0).
    #[serde(default = "default_neg_1_0")]
    pub strength_floor: f32,
    /// Strength assigned to a freshly created relationship.
    #[serde(default = "default_0_1")]
    pub default_strength: f32,
    /// How much strength moves toward zero per neglected day.
    #[serde(default = "default_0_01")]
    pub decay_rate_per_day: f32,
    /// Cap on the shared-memories list (most-recent-last).
    #[serde(default = "default_10")]
    pub max_shared_memories: usize,
    /// Cap on the sentiment history list.
    #[serde(default = "default_10")]
    pub max_sentiment_history: usize,
    /// Shared-memory entries are truncated to this many characters.
    #[serde(default = "default_200")]
    pub shared_memory_max_chars: usize,
    /// Minimum mutual strength for cluster membership.
    #[serde(default = "default_0_4")]
    pub cluster_strength_threshold: f32,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            strength_floor: -1.0,
            default_strength: 0.1,
            decay_rate_per_day: 0.01,
            max_shared_memories: 10,
            max_sentiment_history: 10,
            shared_memory_max_chars: 200,
            cluster_strength_threshold: 0.4,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store CRC-32 checksums alongside persisted rows.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: "reverie.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_db_path() -> String { "reverie.db".to_string() }
fn default_0_01() -> f32 { 0.01 }
fn default_0_02() -> f32 { 0.02 }
fn default_0_1() -> f32 { 0.1 }
fn default_0_2() -> f64 { 0.2 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_4() -> f32 { 0.4 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_85() -> f32 { 0.85 }
fn default_1_0() -> f32 { 1.0 }
fn default_neg_1_0() -> f32 { -1.0 }
fn default_24_0() -> f64 { 24.0 }
fn default_150_0() -> f64 { 150.0 }
fn default_3() -> usize { 3 }
fn default_5_u8() -> u8 { 5 }
fn default_5_usize() -> usize { 5 }
fn default_8() -> u8 { 8 }
fn default_10() -> usize { 10 }
fn default_50() -> usize { 50 }
fn default_100() -> usize { 100 }
fn default_200() -> usize { 200 }
fn default_500() -> usize { 500 }
