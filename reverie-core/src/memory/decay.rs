//! Time-based importance decay and pruning.
//!
//! Importance fades linearly with age:
//!
//!   decayed = importance × (1 − decay_rate_per_day × age_days)
//!
//! floored at 0. Memories whose decayed importance falls below the prune
//! threshold are deleted. Reflections and consolidated memories are
//! exempt — distilled knowledge does not fade with the raw experiences
//! that produced it.
//!
//! Each record carries a `last_decay` watermark and a pass decays only by
//! the days elapsed since the previous pass, so back-to-back passes with
//! zero elapsed time are no-ops instead of compounding.

use crate::config::MemoryConfig;
use crate::memory::MemoryRecord;
use crate::types::Timestamp;

/// Apply one decay step to an importance value.
#[must_use]
pub fn decayed_importance(importance: f32, elapsed_days: f64, decay_rate_per_day: f32) -> f32 {
    let factor = 1.0 - decay_rate_per_day * elapsed_days as f32;
    (importance * factor.min(1.0)).clamp(0.0, 10.0)
}

/// Run a decay pass over a set of records, pruning those that fall below
/// the threshold. Returns the number of records pruned.
pub fn decay_and_prune(
    records: &mut Vec<MemoryRecord>,
    now: &Timestamp,
    config: &MemoryConfig,
) -> usize {
    let before = records.len();

    records.retain_mut(|record| {
        if record.category.is_decay_exempt() {
            return true;
        }

        let elapsed_days = now.days_since(&record.last_decay);
        let decayed = decayed_importance(record.importance, elapsed_days, config.decay_rate_per_day);

        if decayed < config.prune_threshold {
            return false;
        }
        record.importance = decayed;
        record.last_decay = *now;
        true
    });

    before - records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryCategory;

    fn record(text: &str, importance: f32, age_days: i64, category: MemoryCategory) -> MemoryRecord {
        let created = Timestamp::now().minus_seconds(age_days * 86_400);
        let mut r = MemoryRecord::new(text, None, importance, category, created);
        r.last_decay = created;
        r
    }

    #[test]
    fn fresh_memories_do_not_decay() {
        let imp = decayed_importance(8.0, 0.0, 0.02);
        assert!((imp - 8.0).abs() < 1e-6);
    }

    #[test]
    fn decay_is_linear_in_age() {
        // 10 days at 0.02/day → 20% lost.
        let imp = decayed_importance(5.0, 10.0, 0.02);
        assert!((imp - 4.0).abs() < 1e-5);
    }

    #[test]
    fn decay_floors_at_zero() {
        let imp = decayed_importance(5.0, 1000.0, 0.02);
        assert_eq!(imp, 0.0);
    }

    #[test]
    fn prunes_below_threshold() {
        let mut records = vec![
            record("faded small talk", 1.0, 30, MemoryCategory::Conversation),
            record("the fire at the mill", 9.0, 30, MemoryCategory::Observation),
        ];
        let now = Timestamp::now();
        let pruned = decay_and_prune(&mut records, &now, &MemoryConfig::default());
        assert_eq!(pruned, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "the fire at the mill");
    }

    #[test]
    fn exempt_categories_are_untouched() {
        let mut records = vec![
            record("I realize I value the market mornings", 8.0, 365, MemoryCategory::Reflection),
            record("many trips to the well, combined", 6.0, 365, MemoryCategory::Consolidated),
        ];
        let now = Timestamp::now();
        let pruned = decay_and_prune(&mut records, &now, &MemoryConfig::default());
        assert_eq!(pruned, 0);
        assert!((records[0].importance - 8.0).abs() < 1e-6);
        assert!((records[1].importance - 6.0).abs() < 1e-6);
    }

    #[test]
    fn back_to_back_passes_are_idempotent() {
        let mut records = vec![record("a week-old chat", 5.0, 7, MemoryCategory::Conversation)];
        let now = Timestamp::now();
        let config = MemoryConfig::default();

        decay_and_prune(&mut records, &now, &config);
        let after_first = records[0].importance;

        // Second pass at the same instant: no elapsed time, no change.
        let pruned = decay_and_prune(&mut records, &now, &config);
        assert_eq!(pruned, 0);
        assert!((records[0].importance - after_first).abs() < 1e-6);
    }

    #[test]
    fn importance_stays_in_domain() {
        let mut records = vec![record("an old errand", 10.0, 45, MemoryCategory::ActionUpdate)];
        let now = Timestamp::now();
        decay_and_prune(&mut records, &now, &MemoryConfig::default());
        if let Some(r) = records.first() {
            assert!(r.importance >= 0.0 && r.importance <= 10.0);
        }
    }
}
