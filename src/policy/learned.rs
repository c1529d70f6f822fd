//! Learned Retention Policy - Tabular Q-Learning
//!
//! `TigerStyle`: Typed discretized state with a stable hash, explicit value
//! table, seeded exploration. No stringly-typed state keys: the state space
//! is auditable from the bucket functions below.
//!
//! ```text
//! LearnedPolicy
//! ├── decide()  → ε-greedy over QTable; ε decays with episodes
//! ├── learn()   → Q(s,a) ← Q(s,a) + α[r + γ·max Q(s',·) − Q(s,a)]
//! └── snapshot()/restore() → serde persistence across restarts
//! ```
//!
//! A corrupt snapshot degrades to a fresh zero table with a warning; the
//! policy kind never silently changes.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::context::{RetentionAction, RetentionContext, RetentionOutcome};
use super::RetentionPolicy;
use crate::constants::{
    QLEARN_ALPHA, QLEARN_EPSILON_DECAY_EPISODES, QLEARN_EPSILON_FLOOR, QLEARN_EPSILON_START,
    QLEARN_GAMMA, QLEARN_REWARD_TOKENS_SCALE,
};
use crate::dst::DeterministicRng;

// =============================================================================
// Reward Profiles
// =============================================================================

/// Weights over the four reward terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    /// Weight on normalized tokens saved
    pub tokens_saved: f64,
    /// Weight on post-action retrieval accuracy
    pub retrieval_accuracy: f64,
    /// Penalty weight on information loss
    pub information_loss: f64,
    /// Weight on the coarse satisfaction proxy
    pub user_satisfaction: f64,
}

/// Named reward profile selecting the weights.
///
/// The weights are configuration defaults, not hard law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardProfile {
    /// Roughly equal weights
    Balanced,
    /// Triples the token-savings weight, halves the loss penalty
    CostFocused,
    /// Doubles the accuracy weight, five times the loss penalty
    QualityFocused,
}

impl RewardProfile {
    /// The weights this profile selects.
    #[must_use]
    pub fn weights(&self) -> RewardWeights {
        match self {
            RewardProfile::Balanced => RewardWeights {
                tokens_saved: 1.0,
                retrieval_accuracy: 1.0,
                information_loss: 1.0,
                user_satisfaction: 1.0,
            },
            RewardProfile::CostFocused => RewardWeights {
                tokens_saved: 3.0,
                retrieval_accuracy: 1.0,
                information_loss: 0.5,
                user_satisfaction: 1.0,
            },
            RewardProfile::QualityFocused => RewardWeights {
                tokens_saved: 1.0,
                retrieval_accuracy: 2.0,
                information_loss: 5.0,
                user_satisfaction: 1.0,
            },
        }
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardProfile::Balanced => "balanced",
            RewardProfile::CostFocused => "cost_focused",
            RewardProfile::QualityFocused => "quality_focused",
        }
    }
}

impl std::fmt::Display for RewardProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reward for one outcome under a profile.
#[must_use]
pub fn reward_for(outcome: &RetentionOutcome, profile: RewardProfile) -> f64 {
    let w = profile.weights();
    let tokens_term = (outcome.tokens_saved as f64 / QLEARN_REWARD_TOKENS_SCALE).min(1.0);

    w.tokens_saved * tokens_term + w.retrieval_accuracy * outcome.retrieval_accuracy()
        - w.information_loss * outcome.information_loss()
        + w.user_satisfaction * outcome.user_satisfaction()
}

// =============================================================================
// Discretized State
// =============================================================================

/// Bucketed feature vector over a [`RetentionContext`].
///
/// `TigerStyle`: Small fixed buckets keep the state space auditable
/// (5 × 5 × 5 × 3 × 5 × 5 = 9,375 states at most).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DiscretizedState {
    /// Bucketed CRITICAL+HIGH count
    pub high_bucket: u8,
    /// Bucketed LOW+NOISE count
    pub low_bucket: u8,
    /// Bucketed estimated token volume
    pub token_bucket: u8,
    /// Bucketed salience-entropy diversity estimate
    pub diversity_bucket: u8,
    /// Bucketed mean salience weight
    pub importance_bucket: u8,
    /// Bucketed memories-since-last-action
    pub staleness_bucket: u8,
}

impl DiscretizedState {
    /// Discretize a context snapshot.
    #[must_use]
    pub fn from_context(context: &RetentionContext) -> Self {
        Self {
            high_bucket: bucket_count(context.high_value_count()),
            low_bucket: bucket_count(context.low_noise_count()),
            token_bucket: bucket_tokens(context.estimated_tokens),
            diversity_bucket: bucket_diversity(context.salience_entropy()),
            importance_bucket: bucket_importance(context.mean_salience_weight()),
            staleness_bucket: bucket_count(context.memories_since_last_action),
        }
    }

    /// Stable FNV-1a hash of the state, independent of process or platform.
    ///
    /// Useful as an external key when exporting the table for inspection.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let bytes = [
            self.high_bucket,
            self.low_bucket,
            self.token_bucket,
            self.diversity_bucket,
            self.importance_bucket,
            self.staleness_bucket,
        ];

        let mut hash = FNV_OFFSET;
        for byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

fn bucket_count(count: usize) -> u8 {
    match count {
        0 => 0,
        1..=10 => 1,
        11..=50 => 2,
        51..=200 => 3,
        _ => 4,
    }
}

fn bucket_tokens(tokens: usize) -> u8 {
    match tokens {
        0 => 0,
        1..=1_000 => 1,
        1_001..=10_000 => 2,
        10_001..=100_000 => 3,
        _ => 4,
    }
}

fn bucket_diversity(entropy: f64) -> u8 {
    if entropy < 0.33 {
        0
    } else if entropy < 0.66 {
        1
    } else {
        2
    }
}

fn bucket_importance(mean_weight: f64) -> u8 {
    ((mean_weight / 25.0) as u8).min(4)
}

// =============================================================================
// Q-Table
// =============================================================================

/// Explicit state → per-action value table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QTable {
    entries: HashMap<DiscretizedState, [f64; RetentionAction::COUNT]>,
}

impl QTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of an action in a state (0.0 for unseen states).
    #[must_use]
    pub fn value(&self, state: &DiscretizedState, action: RetentionAction) -> f64 {
        self.entries
            .get(state)
            .map_or(0.0, |values| values[action.index()])
    }

    /// Set the value of an action in a state.
    pub fn set_value(&mut self, state: DiscretizedState, action: RetentionAction, value: f64) {
        self.entries.entry(state).or_insert([0.0; RetentionAction::COUNT])[action.index()] = value;
    }

    /// Highest action value in a state.
    #[must_use]
    pub fn best_value(&self, state: &DiscretizedState) -> f64 {
        self.entries.get(state).map_or(0.0, |values| {
            values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
    }

    /// Greedy action for a state; ties resolve to the lowest index, so an
    /// untrained state prefers `DoNothing`.
    #[must_use]
    pub fn best_action(&self, state: &DiscretizedState) -> RetentionAction {
        let Some(values) = self.entries.get(state) else {
            return RetentionAction::DoNothing;
        };

        let mut best_index = 0;
        for (index, value) in values.iter().enumerate() {
            if *value > values[best_index] {
                best_index = index;
            }
        }
        RetentionAction::from_index(best_index)
    }

    /// Number of visited states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no state has been visited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of non-zero action values across the table.
    #[must_use]
    pub fn nonzero_values(&self) -> usize {
        self.entries
            .values()
            .flat_map(|values| values.iter())
            .filter(|v| **v != 0.0)
            .count()
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// Errors from learned-policy state persistence.
#[derive(Debug, Error)]
pub enum PolicyStateError {
    /// Snapshot bytes did not parse; the policy starts from a fresh table.
    #[error("policy state corrupt: {message}")]
    Corrupt {
        /// Parse failure detail
        message: String,
    },

    /// Snapshot file could not be read or written.
    #[error("policy state io: {message}")]
    Io {
        /// I/O failure detail
        message: String,
    },
}

/// Serializable snapshot of the learned policy's persistent state.
///
/// The Q-table is the strategy's only persistent state; the exploration
/// RNG deliberately is not captured (a restart re-seeds exploration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Reward profile the table was trained under
    pub profile: RewardProfile,
    /// Completed episodes
    pub episodes: u64,
    /// Accumulated reward
    pub total_reward: f64,
    /// Table entries as (state, per-action values)
    pub entries: Vec<(DiscretizedState, [f64; RetentionAction::COUNT])>,
}

impl PolicySnapshot {
    /// Serialize to JSON.
    ///
    /// # Errors
    /// Returns `Corrupt` if serialization fails (it cannot for this type
    /// under normal operation).
    pub fn to_json(&self) -> Result<String, PolicyStateError> {
        serde_json::to_string_pretty(self).map_err(|e| PolicyStateError::Corrupt {
            message: e.to_string(),
        })
    }

    /// Parse from JSON.
    ///
    /// # Errors
    /// Returns `Corrupt` when the bytes do not parse.
    pub fn from_json(json: &str) -> Result<Self, PolicyStateError> {
        serde_json::from_str(json).map_err(|e| PolicyStateError::Corrupt {
            message: e.to_string(),
        })
    }

    /// Write to a file.
    ///
    /// # Errors
    /// Returns `Io` on filesystem failure.
    pub fn save(&self, path: &Path) -> Result<(), PolicyStateError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| PolicyStateError::Io {
            message: e.to_string(),
        })
    }

    /// Read from a file.
    ///
    /// # Errors
    /// Returns `Io` when the file cannot be read, `Corrupt` when it does
    /// not parse.
    pub fn load(path: &Path) -> Result<Self, PolicyStateError> {
        let json = std::fs::read_to_string(path).map_err(|e| PolicyStateError::Io {
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }
}

// =============================================================================
// Learned Policy
// =============================================================================

/// Q-learning retention strategy.
#[derive(Debug)]
pub struct LearnedPolicy {
    profile: RewardProfile,
    q_table: QTable,
    episodes: u64,
    total_reward: f64,
    rng: DeterministicRng,
}

impl LearnedPolicy {
    /// Create a fresh policy.
    #[must_use]
    pub fn new(profile: RewardProfile, rng: DeterministicRng) -> Self {
        Self {
            profile,
            q_table: QTable::new(),
            episodes: 0,
            total_reward: 0.0,
            rng,
        }
    }

    /// Restore a policy from a snapshot.
    #[must_use]
    pub fn restore(snapshot: PolicySnapshot, rng: DeterministicRng) -> Self {
        let mut q_table = QTable::new();
        for (state, values) in snapshot.entries {
            for (index, value) in values.iter().enumerate() {
                if *value != 0.0 {
                    q_table.set_value(state, RetentionAction::from_index(index), *value);
                }
            }
        }

        Self {
            profile: snapshot.profile,
            q_table,
            episodes: snapshot.episodes,
            total_reward: snapshot.total_reward,
            rng,
        }
    }

    /// Restore from a snapshot file, degrading to a fresh table when the
    /// file is corrupt or missing. The policy kind never changes.
    #[must_use]
    pub fn restore_or_fresh(path: &Path, profile: RewardProfile, rng: DeterministicRng) -> Self {
        match PolicySnapshot::load(path) {
            Ok(snapshot) => Self::restore(snapshot, rng),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    %error,
                    "learned policy state unreadable; starting from a fresh table"
                );
                Self::new(profile, rng)
            }
        }
    }

    /// Snapshot the persistent state.
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        let mut entries: Vec<(DiscretizedState, [f64; RetentionAction::COUNT])> = self
            .q_table
            .entries
            .iter()
            .map(|(state, values)| (*state, *values))
            .collect();
        entries.sort_by_key(|(state, _)| *state);

        PolicySnapshot {
            profile: self.profile,
            episodes: self.episodes,
            total_reward: self.total_reward,
            entries,
        }
    }

    /// Current exploration rate: starts at 0.30 and decays exponentially
    /// toward the 0.05 floor as episodes grow.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        let decayed =
            QLEARN_EPSILON_START * (-(self.episodes as f64) / QLEARN_EPSILON_DECAY_EPISODES).exp();
        decayed.max(QLEARN_EPSILON_FLOOR)
    }

    /// Completed episodes.
    #[must_use]
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// Accumulated reward.
    #[must_use]
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// Active reward profile.
    #[must_use]
    pub fn profile(&self) -> RewardProfile {
        self.profile
    }

    /// Read access to the value table.
    #[must_use]
    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    /// Normalized value estimate for a context in [0, 10], for the
    /// retention scorer's learned-value band.
    #[must_use]
    pub fn value_estimate(&self, context: &RetentionContext) -> f64 {
        let state = DiscretizedState::from_context(context);
        self.q_table.best_value(&state).clamp(0.0, 10.0)
    }

    /// Greedy decision without exploration (used by tests and dry runs).
    #[must_use]
    pub fn greedy_decision(&self, context: &RetentionContext) -> RetentionAction {
        self.q_table
            .best_action(&DiscretizedState::from_context(context))
    }
}

impl RetentionPolicy for LearnedPolicy {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn decide(&mut self, context: &RetentionContext) -> RetentionAction {
        let state = DiscretizedState::from_context(context);

        if self.rng.next_float() < self.epsilon() {
            let index = self.rng.next_bounded(RetentionAction::COUNT as u64) as usize;
            return RetentionAction::from_index(index);
        }

        self.q_table.best_action(&state)
    }

    fn learn(
        &mut self,
        context: &RetentionContext,
        action: RetentionAction,
        outcome: &RetentionOutcome,
    ) {
        let state = DiscretizedState::from_context(context);
        let next_state = DiscretizedState::from_context(&context.projected_after(outcome));

        let reward = reward_for(outcome, self.profile);
        let current = self.q_table.value(&state, action);
        let next_best = self.q_table.best_value(&next_state);

        let updated = current + QLEARN_ALPHA * (reward + QLEARN_GAMMA * next_best - current);
        self.q_table.set_value(state, action, updated);

        self.episodes += 1;
        self.total_reward += reward;
    }
}

// =============================================================================
// Tests
// =============================================================================
