//! Per-factor scoring functions for memory retrieval.
//!
//! Composite = α·Relevance + β·Recency + γ·Importance
//!
//! Where:
//!   Relevance  = raw similarity score from the vector search (∈ [0, 1])
//!   Recency    = exp(-ln2 · age_seconds / half_life_seconds)
//!   Importance = importance_raw / 10
//!
//! Pure vector similarity ignores staleness and salience, which is why
//! retrieval over-fetches candidates and re-ranks them with this score.

use crate::config::RetrievalConfig;
use crate::types::Timestamp;

/// ln(2), the half-life decay constant.
const LN_2: f64 = std::f64::consts::LN_2;

/// Recency factor: exponential decay that halves every `half_life_seconds`.
///
/// Returns 1.0 for brand-new memories and 0.0 when the half-life is
/// non-positive (recency disabled).
#[must_use]
pub fn recency_factor(age_seconds: f64, half_life_seconds: f64) -> f64 {
    if half_life_seconds <= 0.0 {
        return 0.0;
    }
    (-LN_2 * age_seconds.max(0.0) / half_life_seconds).exp()
}

/// Importance factor: raw 1–10 rating mapped into [0, 1].
#[must_use]
pub fn importance_factor(importance_raw: f32) -> f64 {
    f64::from(importance_raw.clamp(0.0, 10.0)) / 10.0
}

/// Composite retrieval score for a single memory.
#[must_use]
pub fn composite_score(
    relevance: f64,
    created_at: &Timestamp,
    importance_raw: f32,
    now: &Timestamp,
    config: &RetrievalConfig,
) -> f64 {
    let age_seconds = now.seconds_since(created_at);
    let recency = recency_factor(age_seconds, config.half_life_hours * 3600.0);
    config.relevance_weight * relevance.clamp(0.0, 1.0)
        + config.recency_weight * recency
        + config.importance_weight * importance_factor(importance_raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_is_one_when_fresh() {
        assert!((recency_factor(0.0, 86_400.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recency_halves_at_half_life() {
        let r = recency_factor(86_400.0, 86_400.0);
        assert!((r - 0.5).abs() < 1e-9, "one half-life should score exactly 0.5, got {r}");
    }

    #[test]
    fn recency_quarters_at_two_half_lives() {
        let r = recency_factor(2.0 * 86_400.0, 86_400.0);
        assert!((r - 0.25).abs() < 1e-9);
    }

    #[test]
    fn zero_half_life_disables_recency() {
        assert_eq!(recency_factor(100.0, 0.0), 0.0);
    }

    #[test]
    fn importance_maps_rating_to_unit_interval() {
        assert!((importance_factor(10.0) - 1.0).abs() < 1e-9);
        assert!((importance_factor(5.0) - 0.5).abs() < 1e-9);
        assert!((importance_factor(0.0)).abs() < 1e-9);
        // Out-of-range ratings are clamped, never amplified.
        assert!((importance_factor(25.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn composite_prefers_relevant_recent_important() {
        let config = RetrievalConfig::default();
        let now = Timestamp::now();
        let fresh = now.minus_seconds(60);
        let stale = now.minus_seconds(7 * 86_400);

        let strong = composite_score(0.9, &fresh, 9.0, &now, &config);
        let weak = composite_score(0.2, &stale, 2.0, &now, &config);
        assert!(strong > weak);
    }

    #[test]
    fn composite_weights_break_similarity_ties() {
        // Equal relevance: the more recent, more important memory wins.
        let config = RetrievalConfig::default();
        let now = Timestamp::now();
        let a = composite_score(0.5, &now.minus_seconds(60), 8.0, &now, &config);
        let b = composite_score(0.5, &now.minus_seconds(2 * 86_400), 3.0, &now, &config);
        assert!(a > b);
    }
}
