//! Retention Policy - Interchangeable Decision Strategies
//!
//! `TigerStyle`: One trait, two strategies, capability resolved once at
//! construction.
//!
//! # Architecture
//!
//! ```text
//! RetentionPolicy (trait)
//! ├── RuleBasedPolicy   deterministic fixed-order thresholds
//! └── LearnedPolicy     tabular Q-learning, ε-greedy, persistent table
//! ```
//!
//! The engine owns exactly one policy, chosen by [`PolicyKind`] at
//! construction. Failure to construct the requested policy is a
//! construction-time concern; there is no silent per-call fallback from one
//! strategy to the other.

mod context;
mod learned;
mod rules;

pub use context::{RetentionAction, RetentionContext, RetentionOutcome};
pub use learned::{
    reward_for, DiscretizedState, LearnedPolicy, PolicySnapshot, PolicyStateError, QTable,
    RewardProfile, RewardWeights,
};
pub use rules::{RuleBasedPolicy, RuleThresholds};

use crate::dst::DeterministicRng;

// =============================================================================
// Policy Trait
// =============================================================================

/// One retention decision strategy.
///
/// `decide` observes a fresh context snapshot and picks one action;
/// `learn` feeds the executed outcome back (a no-op for deterministic
/// strategies).
pub trait RetentionPolicy: Send + std::fmt::Debug {
    /// Stable policy name for ledger events and statistics.
    fn name(&self) -> &'static str;

    /// Choose one action for the observed population.
    fn decide(&mut self, context: &RetentionContext) -> RetentionAction;

    /// Feed back the outcome of an executed action.
    fn learn(
        &mut self,
        context: &RetentionContext,
        action: RetentionAction,
        outcome: &RetentionOutcome,
    );
}

// =============================================================================
// Policy Kind
// =============================================================================

/// Capability selector resolved once at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Deterministic threshold rules
    RuleBased,
    /// Q-learning with the given reward profile
    Learned(RewardProfile),
}

impl PolicyKind {
    /// Build the selected strategy.
    ///
    /// `seed` drives the learned strategy's exploration; the rule strategy
    /// ignores it.
    #[must_use]
    pub fn build(&self, seed: u64) -> Box<dyn RetentionPolicy> {
        match self {
            PolicyKind::RuleBased => Box::new(RuleBasedPolicy::new()),
            PolicyKind::Learned(profile) => {
                Box::new(LearnedPolicy::new(*profile, DeterministicRng::new(seed)))
            }
        }
    }

    /// Build the learned strategy from a snapshot file, degrading to a
    /// fresh table when the file is corrupt or missing (never to a
    /// different policy kind). For `RuleBased` this is identical to
    /// [`PolicyKind::build`].
    #[must_use]
    pub fn build_from_state(&self, state_path: &std::path::Path, seed: u64) -> Box<dyn RetentionPolicy> {
        match self {
            PolicyKind::RuleBased => Box::new(RuleBasedPolicy::new()),
            PolicyKind::Learned(profile) => Box::new(LearnedPolicy::restore_or_fresh(
                state_path,
                *profile,
                DeterministicRng::new(seed),
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
