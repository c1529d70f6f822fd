//! Rule-Based Retention Policy
//!
//! `TigerStyle`: Deterministic fixed-order checks, thresholds as data.

use serde::{Deserialize, Serialize};

use super::context::{RetentionAction, RetentionContext, RetentionOutcome};
use super::RetentionPolicy;
use crate::constants::{
    POLICY_COMPRESS_AGGRESSIVE_THRESHOLD_DEFAULT, POLICY_COMPRESS_LIGHT_THRESHOLD_DEFAULT,
    POLICY_DECAY_AGE_DAYS_DEFAULT, POLICY_LOW_NOISE_THRESHOLD_DEFAULT,
};

// =============================================================================
// Thresholds
// =============================================================================

/// Tunable thresholds for the rule policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// LOW+NOISE count that triggers `ConsolidateAndDecay`
    pub low_noise_count: usize,
    /// Total count that triggers `CompressAggressive`
    pub aggressive_count: usize,
    /// Total count that triggers `CompressLight`
    pub light_count: usize,
    /// Oldest-memory age that triggers `DecayLowValue`
    pub decay_age_days: u64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            low_noise_count: POLICY_LOW_NOISE_THRESHOLD_DEFAULT,
            aggressive_count: POLICY_COMPRESS_AGGRESSIVE_THRESHOLD_DEFAULT,
            light_count: POLICY_COMPRESS_LIGHT_THRESHOLD_DEFAULT,
            decay_age_days: POLICY_DECAY_AGE_DAYS_DEFAULT,
        }
    }
}

// =============================================================================
// Rule-Based Policy
// =============================================================================

/// Deterministic threshold policy.
///
/// Checks run in a fixed order; the first triggered rule decides:
///
/// 1. LOW+NOISE count over threshold → `ConsolidateAndDecay`
/// 2. total over aggressive threshold → `CompressAggressive`
/// 3. total over light threshold → `CompressLight`
/// 4. oldest memory over age threshold → `DecayLowValue`
/// 5. otherwise → `DoNothing`
#[derive(Debug, Clone)]
pub struct RuleBasedPolicy {
    thresholds: RuleThresholds,
    decisions: u64,
}

impl RuleBasedPolicy {
    /// Create a policy with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_thresholds(RuleThresholds::default())
    }

    /// Create a policy with explicit thresholds.
    ///
    /// # Preconditions
    /// - the light threshold must be below the aggressive threshold
    #[must_use]
    pub fn with_thresholds(thresholds: RuleThresholds) -> Self {
        assert!(
            thresholds.light_count < thresholds.aggressive_count,
            "light threshold {} must be below aggressive threshold {}",
            thresholds.light_count,
            thresholds.aggressive_count
        );

        Self {
            thresholds,
            decisions: 0,
        }
    }

    /// The active thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    /// Number of decisions made.
    #[must_use]
    pub fn decisions(&self) -> u64 {
        self.decisions
    }
}

impl Default for RuleBasedPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionPolicy for RuleBasedPolicy {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn decide(&mut self, context: &RetentionContext) -> RetentionAction {
        self.decisions += 1;

        if context.low_noise_count() > self.thresholds.low_noise_count {
            return RetentionAction::ConsolidateAndDecay;
        }
        if context.total_memories > self.thresholds.aggressive_count {
            return RetentionAction::CompressAggressive;
        }
        if context.total_memories > self.thresholds.light_count {
            return RetentionAction::CompressLight;
        }
        if context.oldest_age_days > self.thresholds.decay_age_days as f64 {
            return RetentionAction::DecayLowValue;
        }
        RetentionAction::DoNothing
    }

    fn learn(
        &mut self,
        _context: &RetentionContext,
        _action: RetentionAction,
        _outcome: &RetentionOutcome,
    ) {
        // Deterministic policy: nothing to learn.
    }
}

// =============================================================================
// Tests
// =============================================================================
