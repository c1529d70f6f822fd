//! Aggregation - Duplicate Detection and Salience Downgrade
//!
//! `TigerStyle`: Deterministic hashing, monotonic schedules, injected clock.
//!
//! # Architecture
//!
//! ```text
//! Fingerprinter
//! └── fingerprint()  → Fingerprint { content_hash, pattern_hash,
//!                                    error_type, file_path, line_bucket }
//! Aggregator
//! ├── record_occurrence() → AggregateHit | None   (match in window)
//! ├── register()          → track a newly stored record
//! └── downgraded_salience() — occurrence-keyed schedule, never upgrades
//! ```
//!
//! The pattern hash is computed over text normalized by stripping line
//! numbers, timestamps, hex runs and other high-cardinality tokens, so two
//! error reports differing only in a timestamp collide.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    AGGREGATION_CACHE_ENTRIES_COUNT_MAX, AGGREGATION_LINE_BUCKET_SIZE,
    AGGREGATION_ONE_TIER_OCCURRENCE_MAX, AGGREGATION_TWO_TIER_OCCURRENCE_MAX,
    AGGREGATION_WINDOW_MS_DEFAULT,
};
use crate::dst::SimClock;
use crate::storage::Salience;

// =============================================================================
// Fingerprint
// =============================================================================

/// Derived key for duplicate and near-duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hash of the trimmed raw text (exact duplicates)
    pub content_hash: String,
    /// Hash of the normalized text (near duplicates)
    pub pattern_hash: String,
    /// First error type in the text, when present
    pub error_type: Option<String>,
    /// Source file from metadata
    pub file_path: Option<String>,
    /// Line number grouped into buckets of `AGGREGATION_LINE_BUCKET_SIZE`
    pub line_bucket: Option<u32>,
}

impl Fingerprint {
    /// Aggregation key: near-duplicate reports from the same place collide.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.pattern_hash,
            self.file_path.as_deref().unwrap_or("-"),
            self.line_bucket.map_or(-1_i64, i64::from),
        )
    }
}

// =============================================================================
// Fingerprinter
// =============================================================================

/// Computes fingerprints over raw text plus metadata.
#[derive(Debug)]
pub struct Fingerprinter {
    timestamp_re: Regex,
    hex_run_re: Regex,
    number_re: Regex,
    error_type_re: Regex,
}

impl Fingerprinter {
    /// Create a fingerprinter with the normalization patterns compiled.
    ///
    /// # Panics
    /// Panics only if a built-in pattern fails to compile.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timestamp_re: Regex::new(
                r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
            )
            .expect("timestamp pattern"),
            hex_run_re: Regex::new(r"\b[0-9a-f]{7,40}\b").expect("hex pattern"),
            number_re: Regex::new(r"\d+").expect("number pattern"),
            error_type_re: Regex::new(r"\b([A-Z][A-Za-z]*(?:Error|Exception|Panic|Fault))\b")
                .expect("error type pattern"),
        }
    }

    /// Compute a fingerprint for one memory.
    #[must_use]
    pub fn fingerprint(
        &self,
        text: &str,
        file_path: Option<&str>,
        line_number: Option<u32>,
    ) -> Fingerprint {
        let trimmed = text.trim();

        Fingerprint {
            content_hash: hash_hex(trimmed),
            pattern_hash: hash_hex(&self.normalize(trimmed)),
            error_type: self
                .error_type_re
                .captures(trimmed)
                .map(|c| c[1].to_string()),
            file_path: file_path.map(str::to_string),
            line_bucket: line_number.map(|l| l / AGGREGATION_LINE_BUCKET_SIZE),
        }
    }

    /// Strip high-cardinality tokens so near-duplicates collide.
    fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let no_ts = self.timestamp_re.replace_all(&lowered, "<ts>");
        let no_hex = self.hex_run_re.replace_all(&no_ts, "<hex>");
        let no_num = self.number_re.replace_all(&no_hex, "<n>");
        no_num.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Downgrade Schedule
// =============================================================================

/// Tunable aggregation parameters.
///
/// The bucket boundaries are configuration defaults, not hard law.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Trailing window within which a fingerprint match aggregates
    pub window_ms: u64,
    /// Occurrences through this count drop one tier
    pub one_tier_occurrence_max: u32,
    /// Occurrences through this count drop two tiers, floored at LOW
    pub two_tier_occurrence_max: u32,
    /// Cache entries kept before pruning old fingerprints
    pub cache_entries_max: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_ms: AGGREGATION_WINDOW_MS_DEFAULT,
            one_tier_occurrence_max: AGGREGATION_ONE_TIER_OCCURRENCE_MAX,
            two_tier_occurrence_max: AGGREGATION_TWO_TIER_OCCURRENCE_MAX,
            cache_entries_max: AGGREGATION_CACHE_ENTRIES_COUNT_MAX,
        }
    }
}

/// Salience after `occurrences` sightings of the same fingerprint.
///
/// # Postconditions
/// - never above `base`
/// - non-increasing as `occurrences` grows (monotonic downgrade)
#[must_use]
pub fn downgraded_salience(
    base: Salience,
    occurrences: u32,
    config: &AggregationConfig,
) -> Salience {
    assert!(occurrences >= 1, "occurrences must be >= 1");

    let result = if occurrences == 1 {
        base
    } else if occurrences <= config.one_tier_occurrence_max {
        base.tier_down()
    } else if occurrences <= config.two_tier_occurrence_max {
        // Two tiers down, floored at LOW for tiers that would fall past it,
        // but never above the one-tier stage (monotonicity).
        let two_down = base.tier_down().tier_down();
        let floored = two_down.max(Salience::Low);
        floored.min(base.tier_down())
    } else {
        Salience::Noise
    };

    assert!(result <= base, "downgrade must never upgrade salience");
    result
}

/// Keywords that mark an incoming memory as an error report.
const ERROR_MARKERS: &[&str] = &[
    "error", "exception", "traceback", "panic", "failed", "failure", "fatal",
];

/// Cap error-report salience at MEDIUM regardless of the caller's hint.
///
/// Errors are never CRITICAL on first sight; repetition-driven downgrade
/// needs room to act.
#[must_use]
pub fn cap_error_salience(text: &str, requested: Salience) -> Salience {
    let lowered = text.to_lowercase();
    let is_error = ERROR_MARKERS.iter().any(|marker| lowered.contains(marker));

    if is_error {
        requested.min(Salience::Medium)
    } else {
        requested
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// A fingerprint match against an already-stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateHit {
    /// Id of the record that absorbs this occurrence
    pub memory_id: String,
    /// Occurrence count including this sighting
    pub occurrences: u32,
    /// Salience after the downgrade schedule
    pub salience: Salience,
    /// Whether this sighting crossed a downgrade boundary
    pub downgraded: bool,
}

/// Running aggregation metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationMetrics {
    /// Sightings folded into existing records
    pub duplicates_prevented: u64,
    /// Distinct fingerprints currently tracked
    pub tracked_fingerprints: usize,
}

#[derive(Debug, Clone)]
struct AggregateEntry {
    memory_id: String,
    base_salience: Salience,
    occurrences: u32,
    last_seen_ms: u64,
}

/// Tracks fingerprints inside a trailing window and folds repeats into the
/// record that first carried them.
///
/// Callers must serialize `record_occurrence` per store (the engine holds
/// the aggregator behind a single mutex), which is what prevents the lost
/// update on `occurrence_count` under concurrent ingestion.
#[derive(Debug)]
pub struct Aggregator {
    config: AggregationConfig,
    clock: SimClock,
    entries: HashMap<String, AggregateEntry>,
    duplicates_prevented: u64,
}

impl Aggregator {
    /// Create an aggregator with default configuration.
    #[must_use]
    pub fn new(clock: SimClock) -> Self {
        Self::with_config(clock, AggregationConfig::default())
    }

    /// Create an aggregator with explicit configuration.
    #[must_use]
    pub fn with_config(clock: SimClock, config: AggregationConfig) -> Self {
        assert!(config.window_ms > 0, "window_ms must be > 0");
        assert!(
            config.one_tier_occurrence_max < config.two_tier_occurrence_max,
            "downgrade buckets must be ordered"
        );

        Self {
            config,
            clock,
            entries: HashMap::new(),
            duplicates_prevented: 0,
        }
    }

    /// Record a sighting of `fingerprint`.
    ///
    /// Returns a hit when a matching fingerprint was seen within the
    /// trailing window; the caller applies the hit to the stored record
    /// instead of inserting a new one. Returns None for unseen (or expired)
    /// fingerprints; the caller then stores a fresh record and registers it.
    pub fn record_occurrence(&mut self, fingerprint: &Fingerprint) -> Option<AggregateHit> {
        let now_ms = self.clock.now_ms();
        let key = fingerprint.key();

        let entry = self.entries.get_mut(&key)?;

        if now_ms.saturating_sub(entry.last_seen_ms) > self.config.window_ms {
            // Window elapsed: the repeat starts a fresh aggregation cycle.
            self.entries.remove(&key);
            return None;
        }

        entry.occurrences = entry.occurrences.saturating_add(1);
        entry.last_seen_ms = now_ms;
        self.duplicates_prevented += 1;

        let before = downgraded_salience(
            entry.base_salience,
            entry.occurrences - 1,
            &self.config,
        );
        let after = downgraded_salience(entry.base_salience, entry.occurrences, &self.config);

        Some(AggregateHit {
            memory_id: entry.memory_id.clone(),
            occurrences: entry.occurrences,
            salience: after,
            downgraded: after < before,
        })
    }

    /// Track a newly stored record under its fingerprint.
    pub fn register(&mut self, fingerprint: &Fingerprint, memory_id: &str, salience: Salience) {
        assert!(!memory_id.is_empty(), "memory_id must not be empty");

        let now_ms = self.clock.now_ms();

        if self.entries.len() >= self.config.cache_entries_max {
            self.prune(now_ms);
        }

        self.entries.insert(
            fingerprint.key(),
            AggregateEntry {
                memory_id: memory_id.to_string(),
                base_salience: salience,
                occurrences: 1,
                last_seen_ms: now_ms,
            },
        );
    }

    /// Forget a tracked record (after consolidation or manual removal).
    pub fn forget_memory(&mut self, memory_id: &str) {
        self.entries.retain(|_, e| e.memory_id != memory_id);
    }

    /// Current metrics.
    #[must_use]
    pub fn metrics(&self) -> AggregationMetrics {
        AggregationMetrics {
            duplicates_prevented: self.duplicates_prevented,
            tracked_fingerprints: self.entries.len(),
        }
    }

    /// Drop entries whose window elapsed.
    fn prune(&mut self, now_ms: u64) {
        let window = self.config.window_ms;
        self.entries
            .retain(|_, e| now_ms.saturating_sub(e.last_seen_ms) <= window);
    }
}

// =============================================================================
// Tests
// =============================================================================
