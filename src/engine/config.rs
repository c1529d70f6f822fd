//! Engine Configuration
//!
//! `TigerStyle`: Sensible defaults, builder pattern, explicit over implicit.

use crate::aggregation::AggregationConfig;
use crate::consolidation::ConsolidationConfig;
use crate::constants::{
    MEMORY_LOW_TTL_MS, MEMORY_NOISE_TTL_MS, PIN_LIMIT_PER_PROJECT_COUNT_MAX,
};
use crate::policy::RuleThresholds;

/// Global configuration for the retention engine.
///
/// `TigerStyle`:
/// - Sensible defaults via Default impl
/// - Builder pattern for customization
/// - All fields public for transparency
///
/// # Example
///
/// ```rust
/// use memshed::engine::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_policy_seed(42)
///     .with_pin_limit(10);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Aggregation window and downgrade buckets.
    pub aggregation: AggregationConfig,

    /// Thresholds for the rule-based policy.
    pub rule_thresholds: RuleThresholds,

    /// Consolidation settings used by `CompressLight` and
    /// `ConsolidateAndDecay`.
    pub consolidation_light: ConsolidationConfig,

    /// Consolidation settings used by `CompressAggressive`.
    pub consolidation_aggressive: ConsolidationConfig,

    /// Retention window for NOISE memories before decay eligibility.
    pub noise_ttl_ms: u64,

    /// Retention window for LOW memories before decay eligibility.
    pub low_ttl_ms: u64,

    /// Per-project pin cap.
    pub pin_limit: usize,

    /// Seed for the learned policy's exploration.
    pub policy_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationConfig::default(),
            rule_thresholds: RuleThresholds::default(),
            consolidation_light: ConsolidationConfig::light(),
            consolidation_aggressive: ConsolidationConfig::aggressive(),
            noise_ttl_ms: MEMORY_NOISE_TTL_MS,
            low_ttl_ms: MEMORY_LOW_TTL_MS,
            pin_limit: PIN_LIMIT_PER_PROJECT_COUNT_MAX,
            policy_seed: 0,
        }
    }
}

impl EngineConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aggregation configuration.
    #[must_use]
    pub fn with_aggregation(mut self, aggregation: AggregationConfig) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the rule-policy thresholds.
    #[must_use]
    pub fn with_rule_thresholds(mut self, thresholds: RuleThresholds) -> Self {
        self.rule_thresholds = thresholds;
        self
    }

    /// Set the light consolidation settings.
    #[must_use]
    pub fn with_consolidation_light(mut self, config: ConsolidationConfig) -> Self {
        self.consolidation_light = config;
        self
    }

    /// Set the aggressive consolidation settings.
    #[must_use]
    pub fn with_consolidation_aggressive(mut self, config: ConsolidationConfig) -> Self {
        self.consolidation_aggressive = config;
        self
    }

    /// Set the NOISE retention window.
    #[must_use]
    pub fn with_noise_ttl_ms(mut self, ttl_ms: u64) -> Self {
        assert!(ttl_ms > 0, "noise ttl must be > 0");
        self.noise_ttl_ms = ttl_ms;
        self
    }

    /// Set the LOW retention window.
    #[must_use]
    pub fn with_low_ttl_ms(mut self, ttl_ms: u64) -> Self {
        assert!(ttl_ms > 0, "low ttl must be > 0");
        self.low_ttl_ms = ttl_ms;
        self
    }

    /// Set the per-project pin cap.
    #[must_use]
    pub fn with_pin_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "pin limit must be > 0");
        self.pin_limit = limit;
        self
    }

    /// Set the learned policy's exploration seed.
    #[must_use]
    pub fn with_policy_seed(mut self, seed: u64) -> Self {
        self.policy_seed = seed;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
