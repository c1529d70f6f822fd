//! `SimClock` - Simulated Clock
//!
//! `TigerStyle`: Monotonic, manually advanced, shared via clone.
//!
//! Clones share the same underlying time source, so a clock handed to an
//! aggregator and a scorer stays in lockstep with the test that advances it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::constants::DST_TIME_ADVANCE_MS_MAX;

/// Simulated monotonic clock in epoch milliseconds.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ms: Arc<AtomicU64>,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a new clock starting at the given epoch milliseconds.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Current simulated time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    /// Advance time by `ms` milliseconds, returning the new time.
    ///
    /// # Preconditions
    /// - `ms` must not exceed `DST_TIME_ADVANCE_MS_MAX` (advance large spans
    ///   in daily increments)
    pub fn advance_ms(&self, ms: u64) -> u64 {
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance {} ms exceeds per-step max {}",
            ms,
            DST_TIME_ADVANCE_MS_MAX
        );

        self.now_ms.fetch_add(ms, Ordering::SeqCst) + ms
    }

    /// Advance time by whole days (convenience for retention tests).
    pub fn advance_days(&self, days: u64) -> u64 {
        for _ in 0..days {
            self.advance_ms(crate::constants::TIME_MS_PER_DAY);
        }
        self.now_ms()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIME_MS_PER_DAY;

    #[test]
    fn test_clock_starts_at_zero() {
        let clock = SimClock::new();
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn test_clock_at_ms() {
        let clock = SimClock::at_ms(1_000_000_000);
        assert_eq!(clock.now_ms(), 1_000_000_000);
    }

    #[test]
    fn test_clock_advance() {
        let clock = SimClock::new();
        assert_eq!(clock.advance_ms(500), 500);
        assert_eq!(clock.advance_ms(250), 750);
        assert_eq!(clock.now_ms(), 750);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = SimClock::new();
        let other = clock.clone();

        clock.advance_ms(1234);

        assert_eq!(other.now_ms(), 1234);
    }

    #[test]
    fn test_advance_days() {
        let clock = SimClock::new();
        clock.advance_days(3);
        assert_eq!(clock.now_ms(), 3 * TIME_MS_PER_DAY);
    }

    #[test]
    #[should_panic(expected = "exceeds per-step max")]
    fn test_advance_too_large() {
        let clock = SimClock::new();
        clock.advance_ms(DST_TIME_ADVANCE_MS_MAX + 1);
    }
}
