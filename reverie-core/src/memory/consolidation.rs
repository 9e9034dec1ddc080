//! Memory consolidation — clustering similar long-term memories.
//!
//! When a character's memory count exceeds its cap, long-term memories
//! (everything outside the short-term buffer) are embedded, L2-normalized,
//! and grouped by a greedy single pass: each unassigned item seeds a new
//! cluster and absorbs every later unassigned item whose cosine
//! similarity to the seed meets the threshold. Clusters smaller than the
//! minimum size are rejected and their members left untouched.
//!
//! The greedy pass is order-dependent and deliberately not optimal
//! clustering; only the accepted-cluster invariants (size ≥ minimum, net
//! reduction = members − 1) are guaranteed, not exact membership.

use crate::types::Embedding;

/// Greedy single-pass clustering over normalized embeddings.
///
/// `embeddings` must already be L2-normalized; similarity is computed as
/// the dot product against the cluster seed. Returns only clusters whose
/// final size is at least `min_size`, each as indices into the input
/// slice in their original order.
#[must_use]
pub fn greedy_clusters(
    embeddings: &[Embedding],
    similarity_threshold: f32,
    min_size: usize,
) -> Vec<Vec<usize>> {
    let n = embeddings.len();
    let mut assigned = vec![false; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if assigned[i] {
            continue;
        }
        let mut cluster = vec![i];
        assigned[i] = true;

        for j in (i + 1)..n {
            if assigned[j] {
                continue;
            }
            let sim = dot(&embeddings[i], &embeddings[j]);
            if sim >= similarity_threshold {
                cluster.push(j);
                assigned[j] = true;
            }
        }

        // Rejected clusters keep their members as ordinary memories; they
        // are not revisited within this pass.
        if cluster.len() >= min_size {
            clusters.push(cluster);
        }
    }

    clusters
}

fn dot(a: &Embedding, b: &Embedding) -> f32 {
    a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(components: Vec<f32>) -> Embedding {
        Embedding(components).l2_normalized()
    }

    /// A vector close to `base` (cosine similarity > 0.99).
    fn near(base: &[f32], jitter: f32) -> Embedding {
        let v: Vec<f32> = base.iter().enumerate().map(|(i, x)| x + jitter * (i as f32 + 1.0) * 0.001).collect();
        unit(v)
    }

    #[test]
    fn near_duplicates_form_one_cluster() {
        let base = vec![1.0, 0.2, 0.1, 0.0];
        let mut embeddings: Vec<Embedding> = (0..6).map(|i| near(&base, i as f32)).collect();
        // Two clearly different directions.
        embeddings.push(unit(vec![0.0, 0.0, 0.0, 1.0]));
        embeddings.push(unit(vec![0.0, 1.0, -1.0, 0.0]));

        let clusters = greedy_clusters(&embeddings, 0.85, 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn undersized_clusters_are_rejected() {
        let base = vec![1.0, 0.0, 0.0];
        let embeddings: Vec<Embedding> = (0..3).map(|i| near(&base, i as f32)).collect();
        let clusters = greedy_clusters(&embeddings, 0.85, 5);
        assert!(clusters.is_empty());
    }

    #[test]
    fn rejected_pair_does_not_block_later_cluster() {
        // Items 0 and 1 are similar (pair, below min size 3); items 2..4
        // are similar to each other but not to 0. The pair is rejected
        // and left alone, while the later trio forms its own cluster.
        let a = vec![1.0, 0.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0, 0.0];
        let embeddings = vec![
            near(&a, 0.0),
            near(&a, 1.0),
            near(&b, 0.0),
            near(&b, 1.0),
            near(&b, 2.0),
        ];
        let clusters = greedy_clusters(&embeddings, 0.85, 3);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0], vec![2, 3, 4]);
    }

    #[test]
    fn clustering_is_seed_order_dependent() {
        // Documented approximation: membership depends on input order.
        // The same set with two valid groupings picks whichever seed
        // comes first.
        let base = vec![1.0, 0.5, 0.0];
        let embeddings: Vec<Embedding> = (0..5).map(|i| near(&base, i as f32)).collect();
        let clusters = greedy_clusters(&embeddings, 0.85, 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0][0], 0, "first unassigned item always seeds");
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clusters = greedy_clusters(&[], 0.85, 5);
        assert!(clusters.is_empty());
    }
}
