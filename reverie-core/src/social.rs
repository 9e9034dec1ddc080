//! Relationship graph — pairwise social state between characters.
//!
//! Every unordered pair of characters that has ever interacted owns one
//! [`Relationship`]: a signed strength in [-1, 1], a classification
//! derived from it, interaction bookkeeping, and capped rolling histories
//! of shared memories and sentiment. Updates are commutative-ish by
//! construction: strength deltas shrink as strength approaches either
//! pole, so repeated positive interactions converge instead of saturating
//! in one step.
//!
//! Concurrency: each pair is guarded by its own async mutex, created
//! through a sharded map. Two simultaneous interaction reports for the
//! same pair serialize; reports for different pairs never contend.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SocialConfig;
use crate::types::{CharacterId, Timestamp};

// ---------------------------------------------------------------------------
// Pair key
// ---------------------------------------------------------------------------

/// Canonical key for an unordered character pair.
///
/// The two ids are stored in lexicographic order, so `(a, b)` and
/// `(b, a)` always map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(pub CharacterId, pub CharacterId);

impl PairKey {
    /// Build the canonical key for two characters.
    #[must_use]
    pub fn new(a: &CharacterId, b: &CharacterId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }

    /// Whether this pair involves the given character.
    #[must_use]
    pub fn involves(&self, c: &CharacterId) -> bool {
        &self.0 == c || &self.1 == c
    }

    /// The other member of the pair, if `c` is a member.
    #[must_use]
    pub fn other(&self, c: &CharacterId) -> Option<&CharacterId> {
        if &self.0 == c {
            Some(&self.1)
        } else if &self.1 == c {
            Some(&self.0)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.0, self.1)
    }
}

// ---------------------------------------------------------------------------
// Relation type
// ---------------------------------------------------------------------------

/// Classification of a relationship, derived from its strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Strength below -0.5.
    Enemy,
    /// Strength in [-0.5, 0.0).
    Rival,
    /// Strength in [0.0, 0.4).
    Acquaintance,
    /// Strength in [0.4, 0.7).
    Friend,
    /// Strength 0.7 and above.
    CloseFriend,
}

impl RelationType {
    /// Classify a strength value into its bucket.
    #[must_use]
    pub fn from_strength(strength: f32) -> Self {
        if strength >= 0.7 {
            Self::CloseFriend
        } else if strength >= 0.4 {
            Self::Friend
        } else if strength >= 0.0 {
            Self::Acquaintance
        } else if strength >= -0.5 {
            Self::Rival
        } else {
            Self::Enemy
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enemy => "enemy",
            Self::Rival => "rival",
            Self::Acquaintance => "acquaintance",
            Self::Friend => "friend",
            Self::CloseFriend => "close_friend",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

/// The full social state between two characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// First member (lexicographically smaller id).
    pub a: CharacterId,
    /// Second member.
    pub b: CharacterId,
    /// Classification bucket. Always consistent with `strength`.
    pub relation_type: RelationType,
    /// Signed bond strength in [-1, 1].
    pub strength: f32,
    /// Free-form notes about the relationship.
    pub notes: String,
    /// When the pair last (non-stale) interacted.
    pub last_interaction: Timestamp,
    /// Total interactions recorded, stale ones included.
    pub interaction_count: u32,
    /// Rolling window of shared-experience snippets, newest last.
    pub shared_memories: VecDeque<String>,
    /// Rolling window of interaction sentiments, newest last.
    pub sentiment_history: VecDeque<f32>,
    /// Bumped on every mutation, for change detection by persistence.
    pub version: u64,
}

impl Relationship {
    fn new(key: &PairKey, strength: f32, notes: String, now: Timestamp) -> Self {
        Self {
            a: key.0.clone(),
            b: key.1.clone(),
            relation_type: RelationType::from_strength(strength),
            strength,
            notes,
            last_interaction: now,
            interaction_count: 0,
            shared_memories: VecDeque::new(),
            sentiment_history: VecDeque::new(),
            version: 0,
        }
    }

    /// The member of the pair that is not `c`.
    #[must_use]
    pub fn other(&self, c: &CharacterId) -> Option<&CharacterId> {
        if &self.a == c {
            Some(&self.b)
        } else if &self.b == c {
            Some(&self.a)
        } else {
            None
        }
    }

    /// Set strength (clamped) and its derived classification in one step,
    /// so the two can never disagree.
    fn set_strength(&mut self, strength: f32, floor: f32) {
        self.strength = strength.clamp(floor, 1.0);
        self.relation_type = RelationType::from_strength(self.strength);
    }
}

// ---------------------------------------------------------------------------
// SocialGraph
// ---------------------------------------------------------------------------

/// Concurrent relationship graph over all character pairs.
pub struct SocialGraph {
    pairs: DashMap<PairKey, Arc<Mutex<Relationship>>>,
    config: SocialConfig,
}

impl SocialGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new(config: SocialConfig) -> Self {
        Self {
            pairs: DashMap::new(),
            config,
        }
    }

    /// Number of pairs tracked.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    fn entry(&self, key: PairKey, now: Timestamp) -> Arc<Mutex<Relationship>> {
        let default_strength = self.config.default_strength;
        let floor = self.config.strength_floor;
        Arc::clone(
            &self
                .pairs
                .entry(key.clone())
                .or_insert_with(|| {
                    debug!(pair = %key, "New relationship at default strength");
                    let mut rel = Relationship::new(&key, 0.0, String::new(), now);
                    rel.set_strength(default_strength, floor);
                    Arc::new(Mutex::new(rel))
                }),
        )
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Explicitly set a relationship's strength and notes, creating the
    /// pair if needed. The classification is derived from the clamped
    /// strength.
    pub async fn add_relationship(
        &self,
        a: &CharacterId,
        b: &CharacterId,
        strength: f32,
        notes: &str,
    ) -> Relationship {
        let lock = self.entry(PairKey::new(a, b), Timestamp::now());
        let mut rel = lock.lock().await;
        rel.set_strength(strength, self.config.strength_floor);
        rel.notes = notes.to_string();
        rel.version += 1;
        rel.clone()
    }

    /// Record an interaction between two characters at the current time.
    ///
    /// See [`Self::update_interaction_at`].
    pub async fn update_interaction(
        &self,
        a: &CharacterId,
        b: &CharacterId,
        context: &str,
        sentiment: f32,
    ) -> Relationship {
        self.update_interaction_at(a, b, context, sentiment, Timestamp::now()).await
    }

    /// Record an interaction between two characters at an explicit time.
    ///
    /// Strength moves by a sentiment-scaled delta that shrinks near the
    /// poles: positive interactions add `0.05·(1-s)·(1+sentiment)`,
    /// negative ones add `0.05·sentiment·(1+|s|)`. The context snippet and
    /// sentiment join their capped rolling histories.
    ///
    /// Stale reports (`now` earlier than the recorded last interaction)
    /// still count as interactions and extend the histories, but leave
    /// strength and `last_interaction` untouched so out-of-order delivery
    /// cannot rewind the bond.
    pub async fn update_interaction_at(
        &self,
        a: &CharacterId,
        b: &CharacterId,
        context: &str,
        sentiment: f32,
        now: Timestamp,
    ) -> Relationship {
        let sentiment = sentiment.clamp(-1.0, 1.0);
        let lock = self.entry(PairKey::new(a, b), now);
        let mut rel = lock.lock().await;

        let stale = now < rel.last_interaction;
        if stale {
            warn!(
                pair = %PairKey::new(a, b),
                event_time = %now,
                last_interaction = %rel.last_interaction,
                "Stale interaction report — counting it without moving strength"
            );
        } else {
            let s = rel.strength;
            let delta = if sentiment >= 0.0 {
                0.05 * (1.0 - s) * (1.0 + sentiment)
            } else {
                0.05 * sentiment * (1.0 + s.abs())
            };
            rel.set_strength(s + delta, self.config.strength_floor);
            rel.last_interaction = now;
        }

        rel.interaction_count += 1;
        rel.version += 1;

        if !context.is_empty() {
            let snippet: String = context.chars().take(self.config.shared_memory_max_chars).collect();
            rel.shared_memories.push_back(snippet);
            while rel.shared_memories.len() > self.config.max_shared_memories {
                rel.shared_memories.pop_front();
            }
        }
        rel.sentiment_history.push_back(sentiment);
        while rel.sentiment_history.len() > self.config.max_sentiment_history {
            rel.sentiment_history.pop_front();
        }

        rel.clone()
    }

    /// Fade all relationships toward neutral by `decay_rate_per_day ×
    /// elapsed_days`, skipping pairs that interacted within the last day.
    /// Returns the number of pairs whose strength moved.
    pub async fn decay_relationships(&self, elapsed_days: f64, now: Timestamp) -> usize {
        let locks: Vec<Arc<Mutex<Relationship>>> =
            self.pairs.iter().map(|e| Arc::clone(e.value())).collect();

        let step = (self.config.decay_rate_per_day * elapsed_days as f32).max(0.0);
        let mut decayed = 0_usize;

        for lock in locks {
            let mut rel = lock.lock().await;
            if now.days_since(&rel.last_interaction) < 1.0 {
                continue;
            }
            let s = rel.strength;
            if s == 0.0 {
                continue;
            }
            // Move toward zero from either sign, never across it.
            let next = if s > 0.0 { (s - step).max(0.0) } else { (s + step).min(0.0) };
            rel.set_strength(next, self.config.strength_floor);
            rel.version += 1;
            decayed += 1;
        }

        if decayed > 0 {
            debug!(pairs = decayed, elapsed_days, "Relationship decay pass");
        }
        decayed
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The relationship between two characters, if one exists.
    pub async fn get_relationship(&self, a: &CharacterId, b: &CharacterId) -> Option<Relationship> {
        let lock = self.pairs.get(&PairKey::new(a, b)).map(|e| Arc::clone(e.value()))?;
        let rel = lock.lock().await;
        Some(rel.clone())
    }

    /// All relationships involving a character.
    pub async fn get_relationships(&self, c: &CharacterId) -> Vec<Relationship> {
        let locks: Vec<Arc<Mutex<Relationship>>> = self
            .pairs
            .iter()
            .filter(|e| e.key().involves(c))
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut out = Vec::with_capacity(locks.len());
        for lock in locks {
            out.push(lock.lock().await.clone());
        }
        out.sort_by(|x, y| {
            y.strength.partial_cmp(&x.strength).unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    /// A consistent copy of every relationship, for persistence and the
    /// graph queries below.
    pub async fn snapshot(&self) -> Vec<Relationship> {
        let locks: Vec<Arc<Mutex<Relationship>>> =
            self.pairs.iter().map(|e| Arc::clone(e.value())).collect();
        let mut out = Vec::with_capacity(locks.len());
        for lock in locks {
            out.push(lock.lock().await.clone());
        }
        out
    }

    /// Replace the graph's contents with previously persisted
    /// relationships.
    pub fn restore(&self, relationships: Vec<Relationship>) {
        self.pairs.clear();
        for rel in relationships {
            let key = PairKey::new(&rel.a, &rel.b);
            self.pairs.insert(key, Arc::new(Mutex::new(rel)));
        }
    }

    /// Natural-language digest of a character's relationships, for
    /// inclusion in a decision prompt.
    pub async fn format_summary(&self, c: &CharacterId) -> String {
        let relationships = self.get_relationships(c).await;
        if relationships.is_empty() {
            return format!("[RELATIONSHIPS] {c} doesn't know anyone yet.");
        }

        let mut lines = vec!["[RELATIONSHIPS] People you know:".to_string()];
        for rel in &relationships {
            let Some(other) = rel.other(c) else { continue };
            let descriptor = if rel.strength >= 0.7 {
                "are close with"
            } else if rel.strength >= 0.4 {
                "know well"
            } else if rel.strength >= 0.2 {
                "somewhat know"
            } else if rel.strength >= 0.0 {
                "barely know"
            } else if rel.strength >= -0.5 {
                "have tension with"
            } else {
                "strongly dislike"
            };

            let mut line = format!("- You {descriptor} {other} ({}).", rel.relation_type);
            if !rel.notes.is_empty() {
                line.push(' ');
                line.push_str(&rel.notes);
            }
            if let Some(last) = rel.shared_memories.back() {
                line.push_str(&format!(" Last interaction: {last}"));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Characters exactly two hops away: friends of friends, excluding
    /// the character and their direct connections.
    pub async fn friends_of_friends(&self, c: &CharacterId) -> Vec<CharacterId> {
        let adjacency = Self::adjacency(&self.snapshot().await);
        let Some(direct) = adjacency.get(c) else {
            return Vec::new();
        };

        let mut second_hop: BTreeSet<CharacterId> = BTreeSet::new();
        for friend in direct {
            if let Some(theirs) = adjacency.get(friend) {
                for candidate in theirs {
                    if candidate != c && !direct.contains(candidate) {
                        second_hop.insert(candidate.clone());
                    }
                }
            }
        }
        second_hop.into_iter().collect()
    }

    /// Shortest chain of acquaintance between two characters, endpoints
    /// included. `None` when the two are not connected.
    pub async fn shortest_social_path(
        &self,
        from: &CharacterId,
        to: &CharacterId,
    ) -> Option<Vec<CharacterId>> {
        if from == to {
            return Some(vec![from.clone()]);
        }
        let adjacency = Self::adjacency(&self.snapshot().await);
        adjacency.get(from)?;

        let mut queue: VecDeque<CharacterId> = VecDeque::from([from.clone()]);
        let mut parent: HashMap<CharacterId, CharacterId> = HashMap::new();
        let mut visited: HashSet<CharacterId> = HashSet::from([from.clone()]);

        while let Some(current) = queue.pop_front() {
            let Some(neighbors) = adjacency.get(&current) else { continue };
            for next in neighbors {
                if !visited.insert(next.clone()) {
                    continue;
                }
                parent.insert(next.clone(), current.clone());
                if next == to {
                    let mut path = vec![to.clone()];
                    let mut node = to.clone();
                    while let Some(p) = parent.get(&node) {
                        path.push(p.clone());
                        node = p.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next.clone());
            }
        }
        None
    }

    /// Friend groups: neighborhoods over edges at or above the cluster
    /// strength threshold, with overlapping neighborhoods merged. Each
    /// cluster is sorted, and clusters are ordered by their first member.
    pub async fn social_clusters(&self) -> Vec<Vec<CharacterId>> {
        let snapshot = self.snapshot().await;
        let threshold = self.config.cluster_strength_threshold;

        let mut strong: BTreeMap<CharacterId, BTreeSet<CharacterId>> = BTreeMap::new();
        for rel in &snapshot {
            if rel.strength >= threshold {
                strong.entry(rel.a.clone()).or_default().insert(rel.b.clone());
                strong.entry(rel.b.clone()).or_default().insert(rel.a.clone());
            }
        }

        let mut clusters: Vec<BTreeSet<CharacterId>> = Vec::new();
        for (node, neighbors) in &strong {
            let mut neighborhood: BTreeSet<CharacterId> = neighbors.clone();
            neighborhood.insert(node.clone());

            // Merge with every existing cluster that shares a member.
            let (mut merged, rest): (Vec<_>, Vec<_>) = clusters
                .into_iter()
                .partition(|cluster| !cluster.is_disjoint(&neighborhood));
            for cluster in &mut merged {
                neighborhood.append(cluster);
            }
            clusters = rest;
            clusters.push(neighborhood);
        }

        let mut out: Vec<Vec<CharacterId>> = clusters
            .into_iter()
            .map(|c| c.into_iter().collect::<Vec<_>>())
            .collect();
        out.sort();
        out
    }

    fn adjacency(snapshot: &[Relationship]) -> HashMap<CharacterId, BTreeSet<CharacterId>> {
        let mut adjacency: HashMap<CharacterId, BTreeSet<CharacterId>> = HashMap::new();
        for rel in snapshot {
            adjacency.entry(rel.a.clone()).or_default().insert(rel.b.clone());
            adjacency.entry(rel.b.clone()).or_default().insert(rel.a.clone());
        }
        adjacency
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
