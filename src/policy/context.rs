//! Retention Context, Actions and Outcomes
//!
//! `TigerStyle`: Pure data snapshots; rebuilt fresh before every decision,
//! never mutated in place.

use serde::{Deserialize, Serialize};

// =============================================================================
// Retention Action
// =============================================================================

/// One retention action chosen per cycle.
///
/// `TigerStyle`: Exhaustive enum; `DoNothing` is index 0 so an untrained
/// value table prefers inaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    /// Leave the population untouched
    DoNothing,
    /// Consolidate LOW/NOISE groups with default settings
    CompressLight,
    /// Consolidate more widely (MEDIUM and below, younger records)
    CompressAggressive,
    /// Remove expired LOW/NOISE memories past their retention window
    DecayLowValue,
    /// Consolidate, then decay
    ConsolidateAndDecay,
}

impl RetentionAction {
    /// All actions in index order.
    #[must_use]
    pub fn all() -> &'static [RetentionAction] {
        &[
            RetentionAction::DoNothing,
            RetentionAction::CompressLight,
            RetentionAction::CompressAggressive,
            RetentionAction::DecayLowValue,
            RetentionAction::ConsolidateAndDecay,
        ]
    }

    /// Number of actions.
    pub const COUNT: usize = 5;

    /// Stable index of this action.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            RetentionAction::DoNothing => 0,
            RetentionAction::CompressLight => 1,
            RetentionAction::CompressAggressive => 2,
            RetentionAction::DecayLowValue => 3,
            RetentionAction::ConsolidateAndDecay => 4,
        }
    }

    /// Action from a stable index.
    ///
    /// # Panics
    /// Panics if `index >= COUNT`.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self::all()[index]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionAction::DoNothing => "do_nothing",
            RetentionAction::CompressLight => "compress_light",
            RetentionAction::CompressAggressive => "compress_aggressive",
            RetentionAction::DecayLowValue => "decay_low_value",
            RetentionAction::ConsolidateAndDecay => "consolidate_and_decay",
        }
    }

    /// Whether this action can mutate stored memories.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, RetentionAction::DoNothing)
    }
}

impl std::fmt::Display for RetentionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Retention Context
// =============================================================================

/// Aggregate snapshot of one project's memory population.
///
/// Built fresh by the engine before each policy decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionContext {
    /// Project this snapshot describes
    pub project_path: String,
    /// Total stored memories
    pub total_memories: usize,
    /// CRITICAL-tier count
    pub critical_count: usize,
    /// HIGH-tier count
    pub high_count: usize,
    /// MEDIUM-tier count
    pub medium_count: usize,
    /// LOW-tier count
    pub low_count: usize,
    /// NOISE-tier count
    pub noise_count: usize,
    /// Mean memory age in days
    pub avg_age_days: f64,
    /// Oldest memory age in days
    pub oldest_age_days: f64,
    /// Estimated token volume of the population
    pub estimated_tokens: usize,
    /// Memories added in the trailing day
    pub memories_added_last_day: usize,
    /// Memories accessed in the trailing day
    pub memories_accessed_last_day: usize,
    /// Memories ingested since the last retention action
    pub memories_since_last_action: usize,
}

impl RetentionContext {
    /// Combined LOW + NOISE count (the rule policy's first trigger).
    #[must_use]
    pub fn low_noise_count(&self) -> usize {
        self.low_count + self.noise_count
    }

    /// Combined CRITICAL + HIGH count.
    #[must_use]
    pub fn high_value_count(&self) -> usize {
        self.critical_count + self.high_count
    }

    /// Normalized Shannon entropy of the salience distribution in [0, 1].
    ///
    /// A population concentrated in one tier scores 0; an even spread over
    /// all five tiers scores 1. Used as the content-diversity estimate in
    /// the learned policy's state vector.
    #[must_use]
    pub fn salience_entropy(&self) -> f64 {
        let counts = [
            self.critical_count,
            self.high_count,
            self.medium_count,
            self.low_count,
            self.noise_count,
        ];
        let total: usize = counts.iter().sum();
        if total == 0 {
            return 0.0;
        }

        let mut entropy = 0.0;
        for count in counts {
            if count == 0 {
                continue;
            }
            let p = count as f64 / total as f64;
            entropy -= p * p.log2();
        }

        let max_entropy = (counts.len() as f64).log2();
        (entropy / max_entropy).clamp(0.0, 1.0)
    }

    /// Mean salience weight in [0, 100].
    #[must_use]
    pub fn mean_salience_weight(&self) -> f64 {
        let total = self.total_memories;
        if total == 0 {
            return 0.0;
        }
        let sum = self.critical_count * 100
            + self.high_count * 75
            + self.medium_count * 50
            + self.low_count * 25
            + self.noise_count * 5;
        sum as f64 / total as f64
    }

    /// Projected snapshot after an outcome, for the learned policy's
    /// next-state estimate. Removed memories come out of the LOW/NOISE
    /// tiers first, which is where every mutating action operates.
    #[must_use]
    pub fn projected_after(&self, outcome: &RetentionOutcome) -> RetentionContext {
        let removed = self
            .total_memories
            .saturating_sub(outcome.memories_after)
            .min(self.low_noise_count());

        let noise_removed = removed.min(self.noise_count);
        let low_removed = (removed - noise_removed).min(self.low_count);

        RetentionContext {
            total_memories: outcome.memories_after,
            noise_count: self.noise_count - noise_removed,
            low_count: self.low_count - low_removed,
            estimated_tokens: self.estimated_tokens.saturating_sub(outcome.tokens_saved),
            memories_since_last_action: 0,
            ..self.clone()
        }
    }
}

// =============================================================================
// Retention Outcome
// =============================================================================

/// What one executed retention action did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionOutcome {
    /// Action that executed
    pub action: RetentionAction,
    /// Memory count before execution
    pub memories_before: usize,
    /// Memory count after execution
    pub memories_after: usize,
    /// Estimated tokens saved
    pub tokens_saved: usize,
    /// Entities carried into replacements
    pub entities_preserved: usize,
    /// Errors encountered during execution
    pub errors: usize,
    /// Wall-clock of the execution in milliseconds
    pub elapsed_ms: u64,
    /// Whether this outcome was projected without mutating anything
    pub dry_run: bool,
}

impl Default for RetentionAction {
    fn default() -> Self {
        RetentionAction::DoNothing
    }
}

impl RetentionOutcome {
    /// Fraction of memories removed, in [0, 1].
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.memories_before == 0 {
            return 0.0;
        }
        let removed = self.memories_before.saturating_sub(self.memories_after);
        (removed as f64 / self.memories_before as f64).clamp(0.0, 1.0)
    }

    /// Post-action retrieval accuracy proxy: 1 minus the observed error
    /// rate over executed operations.
    #[must_use]
    pub fn retrieval_accuracy(&self) -> f64 {
        let operations = self
            .memories_before
            .saturating_sub(self.memories_after)
            .max(1);
        (1.0 - self.errors as f64 / operations as f64).clamp(0.0, 1.0)
    }

    /// Information-loss proxy, proportional to the compression ratio.
    #[must_use]
    pub fn information_loss(&self) -> f64 {
        self.compression_ratio()
    }

    /// Coarse satisfaction proxy: full marks for a clean run.
    #[must_use]
    pub fn user_satisfaction(&self) -> f64 {
        if self.errors == 0 {
            1.0
        } else {
            0.5
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_index_round_trip() {
        for &action in RetentionAction::all() {
            assert_eq!(RetentionAction::from_index(action.index()), action);
        }
        assert_eq!(RetentionAction::all().len(), RetentionAction::COUNT);
    }

    #[test]
    fn test_do_nothing_is_index_zero() {
        assert_eq!(RetentionAction::DoNothing.index(), 0);
        assert!(!RetentionAction::DoNothing.is_mutating());
        assert!(RetentionAction::CompressLight.is_mutating());
    }

    #[test]
    fn test_low_noise_count() {
        let ctx = RetentionContext {
            low_count: 100,
            noise_count: 30,
            ..RetentionContext::default()
        };
        assert_eq!(ctx.low_noise_count(), 130);
    }

    #[test]
    fn test_entropy_bounds() {
        let empty = RetentionContext::default();
        assert_eq!(empty.salience_entropy(), 0.0);

        let concentrated = RetentionContext {
            total_memories: 100,
            noise_count: 100,
            ..RetentionContext::default()
        };
        assert_eq!(concentrated.salience_entropy(), 0.0);

        let even = RetentionContext {
            total_memories: 50,
            critical_count: 10,
            high_count: 10,
            medium_count: 10,
            low_count: 10,
            noise_count: 10,
            ..RetentionContext::default()
        };
        assert!((even.salience_entropy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_salience_weight() {
        let ctx = RetentionContext {
            total_memories: 2,
            critical_count: 1,
            noise_count: 1,
            ..RetentionContext::default()
        };
        assert!((ctx.mean_salience_weight() - 52.5).abs() < 1e-9);
        assert_eq!(RetentionContext::default().mean_salience_weight(), 0.0);
    }

    #[test]
    fn test_projected_after_removes_low_tiers_first() {
        let ctx = RetentionContext {
            total_memories: 150,
            high_count: 20,
            low_count: 100,
            noise_count: 30,
            estimated_tokens: 15_000,
            memories_since_last_action: 42,
            ..RetentionContext::default()
        };

        let outcome = RetentionOutcome {
            action: RetentionAction::ConsolidateAndDecay,
            memories_before: 150,
            memories_after: 60,
            tokens_saved: 9_000,
            ..RetentionOutcome::default()
        };

        let next = ctx.projected_after(&outcome);

        assert_eq!(next.total_memories, 60);
        assert_eq!(next.noise_count, 0); // noise removed first
        assert_eq!(next.low_count, 40);
        assert_eq!(next.high_count, 20); // untouched
        assert_eq!(next.estimated_tokens, 6_000);
        assert_eq!(next.memories_since_last_action, 0);
    }

    #[test]
    fn test_outcome_ratios() {
        let outcome = RetentionOutcome {
            action: RetentionAction::CompressLight,
            memories_before: 100,
            memories_after: 40,
            ..RetentionOutcome::default()
        };

        assert!((outcome.compression_ratio() - 0.6).abs() < 1e-9);
        assert_eq!(outcome.information_loss(), outcome.compression_ratio());
        assert_eq!(outcome.retrieval_accuracy(), 1.0);
        assert_eq!(outcome.user_satisfaction(), 1.0);
    }

    #[test]
    fn test_outcome_with_errors() {
        let outcome = RetentionOutcome {
            memories_before: 10,
            memories_after: 5,
            errors: 1,
            ..RetentionOutcome::default()
        };

        assert!(outcome.retrieval_accuracy() < 1.0);
        assert_eq!(outcome.user_satisfaction(), 0.5);
    }

    #[test]
    fn test_empty_outcome_safe() {
        let outcome = RetentionOutcome::default();
        assert_eq!(outcome.compression_ratio(), 0.0);
        assert_eq!(outcome.retrieval_accuracy(), 1.0);
    }
}
