//! Property-based tests — engine invariants under random inputs.
//!
//! Whatever sequence of interactions, decay passes, or embeddings the
//! simulation produces, these must hold:
//!   - relationship strength stays in [-1, 1] and always agrees with its
//!     classification bucket
//!   - memory importance stays in [0, 10] and never grows under decay
//!   - retrieval factors stay in the unit interval
//!   - clustering never assigns an index to two clusters and never
//!     accepts an undersized cluster

use proptest::prelude::*;

use reverie_core::config::SocialConfig;
use reverie_core::memory::consolidation::greedy_clusters;
use reverie_core::memory::decay::decayed_importance;
use reverie_core::memory::scoring::{importance_factor, recency_factor};
use reverie_core::social::{RelationType, SocialGraph};
use reverie_core::{CharacterId, Embedding};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    #[test]
    fn strength_and_classification_stay_consistent(
        sentiments in prop::collection::vec(-1.0_f32..=1.0, 1..50)
    ) {
        let graph = SocialGraph::new(SocialConfig::default());
        let a = CharacterId::from("mira");
        let b = CharacterId::from("aldo");

        let rel = block_on(async {
            let mut last = None;
            for s in &sentiments {
                last = Some(graph.update_interaction(&a, &b, "", *s).await);
            }
            last.expect("at least one interaction")
        });

        prop_assert!(rel.strength >= -1.0 && rel.strength <= 1.0);
        prop_assert_eq!(rel.relation_type, RelationType::from_strength(rel.strength));
        prop_assert_eq!(rel.interaction_count as usize, sentiments.len());
        prop_assert_eq!(rel.version as usize, sentiments.len());
    }

    #[test]
    fn decay_keeps_importance_in_domain_and_monotone(
        importance in 0.0_f32..=10.0,
        schedule in prop::collection::vec(0.0_f64..30.0, 0..20)
    ) {
        let mut current = importance;
        for elapsed_days in schedule {
            let next = decayed_importance(current, elapsed_days, 0.02);
            prop_assert!(next >= 0.0 && next <= 10.0);
            prop_assert!(next <= current + 1e-6, "decay must never increase importance");
            current = next;
        }
    }

    #[test]
    fn retrieval_factors_stay_in_unit_interval(
        age_seconds in 0.0_f64..1e9,
        half_life in 1.0_f64..1e7,
        importance in -5.0_f32..20.0
    ) {
        // Extreme age/half-life ratios may underflow to exactly 0.0.
        let recency = recency_factor(age_seconds, half_life);
        prop_assert!(recency >= 0.0 && recency <= 1.0);

        let imp = importance_factor(importance);
        prop_assert!(imp >= 0.0 && imp <= 1.0);
    }

    #[test]
    fn recency_is_monotone_in_age(
        age in 0.0_f64..1e6,
        delta in 1.0_f64..1e6,
        half_life in 1e4_f64..1e6
    ) {
        let younger = recency_factor(age, half_life);
        let older = recency_factor(age + delta, half_life);
        prop_assert!(older < younger);
    }

    #[test]
    fn clusters_are_disjoint_and_well_sized(
        raw in prop::collection::vec(prop::collection::vec(-1.0_f32..=1.0, 8), 0..40),
        min_size in 2_usize..6
    ) {
        let embeddings: Vec<Embedding> = raw
            .into_iter()
            .map(|v| Embedding(v).l2_normalized())
            .collect();
        let clusters = greedy_clusters(&embeddings, 0.85, min_size);

        let mut seen = std::collections::HashSet::new();
        for cluster in &clusters {
            prop_assert!(cluster.len() >= min_size);
            for &idx in cluster {
                prop_assert!(idx < embeddings.len());
                prop_assert!(seen.insert(idx), "index {} assigned to two clusters", idx);
            }
        }
    }
}
