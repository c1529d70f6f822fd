//! Retention Scoring - Multi-Factor Bounded Score
//!
//! `TigerStyle`: Every component clamps to its band before summing, so no
//! single signal can dominate unexpectedly. Recency decays with an
//! exponential half-life, like access-pattern tracking.
//!
//! Score bands (total clamped to [0, 200]):
//!
//! ```text
//! salience 0–40 │ usage 0–20 │ recency 0–15 │ learned 0–10
//! density  0–10 │ root-cause 0–15 │ role 0–20 │ pin +100
//! ```

use serde::{Deserialize, Serialize};

use crate::classification::MemoryRole;
use crate::constants::{
    SCORE_DENSITY_MAX, SCORE_FORGET_THRESHOLD_DEFAULT, SCORE_LEARNED_MAX, SCORE_PIN_BONUS,
    SCORE_RECENCY_HALFLIFE_MS, SCORE_RECENCY_MAX, SCORE_ROLE_MAX, SCORE_ROOT_CAUSE_BONUS,
    SCORE_SALIENCE_MAX, SCORE_TOTAL_MAX, SCORE_USAGE_MAX, SCORE_USAGE_POINTS_PER_ACCESS,
};
use crate::dst::SimClock;
use crate::storage::MemoryRecord;

// =============================================================================
// Retention Score
// =============================================================================

/// Component breakdown of one record's retention score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionScore {
    /// Salience component (0–40)
    pub salience: f64,
    /// Usage component (0–20)
    pub usage: f64,
    /// Recency component (0–15)
    pub recency: f64,
    /// Learned-value component (0–10)
    pub learned: f64,
    /// Technical density component (0–10)
    pub density: f64,
    /// Root-cause bonus (0 or 15)
    pub root_cause: f64,
    /// Role priority component (0–20)
    pub role: f64,
    /// Pin bonus (0 or 100)
    pub pin: f64,
    /// Clamped total in [0, 200]
    pub total: f64,
    /// Whether the scored record was pinned
    pub pinned: bool,
}

impl RetentionScore {
    /// Forget decision at the default threshold.
    ///
    /// Pinned records are never forgotten, regardless of the numeric total.
    #[must_use]
    pub fn should_forget(&self) -> bool {
        self.should_forget_at(SCORE_FORGET_THRESHOLD_DEFAULT)
    }

    /// Forget decision at an explicit threshold.
    #[must_use]
    pub fn should_forget_at(&self, threshold: f64) -> bool {
        if self.pinned {
            return false;
        }
        self.total < threshold
    }

    /// One-line component breakdown for diagnostics and ledger reasons.
    #[must_use]
    pub fn breakdown(&self) -> String {
        format!(
            "salience={:.1} usage={:.1} recency={:.1} learned={:.1} density={:.1} root_cause={:.1} role={:.1} pin={:.0} total={:.1}",
            self.salience,
            self.usage,
            self.recency,
            self.learned,
            self.density,
            self.root_cause,
            self.role,
            self.pin,
            self.total,
        )
    }
}

// =============================================================================
// Retention Scorer
// =============================================================================

/// Computes retention scores against an injected clock.
#[derive(Debug, Clone)]
pub struct RetentionScorer {
    clock: SimClock,
}

impl RetentionScorer {
    /// Create a scorer using the given clock.
    #[must_use]
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }

    /// Score a record without a learned-value estimate.
    #[must_use]
    pub fn score(&self, record: &MemoryRecord) -> RetentionScore {
        self.score_with_value(record, None)
    }

    /// Score a record, optionally with the learned policy's value estimate
    /// (normalized to [0, 10]).
    #[must_use]
    pub fn score_with_value(
        &self,
        record: &MemoryRecord,
        learned_value: Option<f64>,
    ) -> RetentionScore {
        let now_ms = self.clock.now_ms();

        let salience =
            (f64::from(record.salience.weight()) / 100.0 * SCORE_SALIENCE_MAX).clamp(0.0, SCORE_SALIENCE_MAX);

        let usage = (f64::from(record.access_count) * SCORE_USAGE_POINTS_PER_ACCESS)
            .clamp(0.0, SCORE_USAGE_MAX);

        let recency = recency_component(now_ms, record.last_accessed_ms);

        let learned = learned_value.unwrap_or(0.0).clamp(0.0, SCORE_LEARNED_MAX);

        let density = (record.entities.count() as f64).clamp(0.0, SCORE_DENSITY_MAX);

        let root_cause = if record.role == MemoryRole::Cause {
            SCORE_ROOT_CAUSE_BONUS
        } else {
            0.0
        };

        let role = f64::from(record.role.priority()).clamp(0.0, SCORE_ROLE_MAX);

        // Pin bonus is applied last and unconditionally overrides the forget
        // decision through `should_forget`.
        let pin = if record.pinned { SCORE_PIN_BONUS } else { 0.0 };

        let total = (salience + usage + recency + learned + density + root_cause + role + pin)
            .clamp(0.0, SCORE_TOTAL_MAX);

        // Postconditions
        assert!((0.0..=SCORE_TOTAL_MAX).contains(&total), "total out of band");
        if record.pinned {
            assert!(total >= SCORE_PIN_BONUS, "pinned record scored below bonus");
        }

        RetentionScore {
            salience,
            usage,
            recency,
            learned,
            density,
            root_cause,
            role,
            pin,
            total,
            pinned: record.pinned,
        }
    }
}

/// Exponential half-life decay of the recency band.
fn recency_component(now_ms: u64, last_accessed_ms: u64) -> f64 {
    let elapsed = now_ms.saturating_sub(last_accessed_ms);
    let decay = elapsed as f64 / SCORE_RECENCY_HALFLIFE_MS as f64;
    (SCORE_RECENCY_MAX * 0.5_f64.powf(decay)).clamp(0.0, SCORE_RECENCY_MAX)
}

// =============================================================================
// Tests
// =============================================================================
