//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `AGGREGATION_WINDOW_MS_DEFAULT` (not `DEFAULT_AGGREGATION_WINDOW`)
//!
//! Every constant includes units in the name:
//! - _`BYTES_MAX/MIN` for size limits
//! - _MS for milliseconds
//! - _`COUNT_MAX` for quantity limits
//! - _`DAYS` for day-granularity durations

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per minute
pub const TIME_MS_PER_MIN: u64 = 60 * TIME_MS_PER_SEC;

/// Milliseconds per hour
pub const TIME_MS_PER_HOUR: u64 = 60 * TIME_MS_PER_MIN;

/// Milliseconds per day
pub const TIME_MS_PER_DAY: u64 = 24 * TIME_MS_PER_HOUR;

// =============================================================================
// Memory Record Limits
// =============================================================================

/// Maximum size of memory verbatim text
pub const MEMORY_TEXT_BYTES_MAX: usize = 100_000; // 100KB

/// Maximum size of a memory gist
pub const MEMORY_GIST_BYTES_MAX: usize = 256;

/// Maximum number of tags per memory
pub const MEMORY_TAGS_COUNT_MAX: usize = 32;

/// Retention window for NOISE memories before decay eligibility
pub const MEMORY_NOISE_TTL_MS: u64 = 7 * TIME_MS_PER_DAY;

/// Retention window for LOW memories before decay eligibility
pub const MEMORY_LOW_TTL_MS: u64 = 30 * TIME_MS_PER_DAY;

/// Bytes-per-token heuristic for volume estimates
pub const MEMORY_TOKEN_ESTIMATE_BYTES: usize = 4;

// =============================================================================
// Entity Extraction Limits
// =============================================================================

/// Maximum size of text to extract from
pub const EXTRACTION_TEXT_BYTES_MAX: usize = 100_000; // 100KB

/// Maximum entities kept per class in one extraction pass
pub const EXTRACTION_CLASS_ENTITIES_COUNT_MAX: usize = 200;

// =============================================================================
// Role Classification
// =============================================================================

/// Base confidence when at least one rule keyword matches
pub const CLASSIFY_CONFIDENCE_BASE: f64 = 0.55;

/// Confidence added per matched keyword (saturating)
pub const CLASSIFY_CONFIDENCE_PER_KEYWORD: f64 = 0.15;

/// Confidence ceiling
pub const CLASSIFY_CONFIDENCE_MAX: f64 = 0.95;

/// Confidence assigned to the CONTEXT default (no rule matched)
pub const CLASSIFY_CONFIDENCE_AMBIGUOUS: f64 = 0.4;

/// Confidence assigned to noise-pattern matches
pub const CLASSIFY_CONFIDENCE_NOISE: f64 = 0.9;

/// Texts at or below this many non-whitespace characters are noise
pub const CLASSIFY_NOISE_CHARS_MAX: usize = 3;

// =============================================================================
// Aggregation / Fingerprinting
// =============================================================================

/// Trailing window in which a repeated fingerprint aggregates
pub const AGGREGATION_WINDOW_MS_DEFAULT: u64 = 7 * TIME_MS_PER_DAY;

/// Line numbers are grouped into buckets of this size
pub const AGGREGATION_LINE_BUCKET_SIZE: u32 = 10;

/// Occurrences up to this count downgrade salience by one tier (2..=5)
pub const AGGREGATION_ONE_TIER_OCCURRENCE_MAX: u32 = 5;

/// Occurrences up to this count downgrade by two tiers, floored at LOW (6..=20)
pub const AGGREGATION_TWO_TIER_OCCURRENCE_MAX: u32 = 20;

/// Maximum fingerprints tracked before pruning
pub const AGGREGATION_CACHE_ENTRIES_COUNT_MAX: usize = 10_000;

// =============================================================================
// Retention Scoring Bands
// =============================================================================

/// Maximum total retention score
pub const SCORE_TOTAL_MAX: f64 = 200.0;

/// Salience component band
pub const SCORE_SALIENCE_MAX: f64 = 40.0;

/// Usage component band
pub const SCORE_USAGE_MAX: f64 = 20.0;

/// Recency component band
pub const SCORE_RECENCY_MAX: f64 = 15.0;

/// Learned-value component band
pub const SCORE_LEARNED_MAX: f64 = 10.0;

/// Technical density component band
pub const SCORE_DENSITY_MAX: f64 = 10.0;

/// Root-cause bonus
pub const SCORE_ROOT_CAUSE_BONUS: f64 = 15.0;

/// Role priority component band
pub const SCORE_ROLE_MAX: f64 = 20.0;

/// Pin bonus (applied last, makes the record immune)
pub const SCORE_PIN_BONUS: f64 = 100.0;

/// Default forget threshold for `should_forget`
pub const SCORE_FORGET_THRESHOLD_DEFAULT: f64 = 30.0;

/// Halflife for the recency component (7 days)
pub const SCORE_RECENCY_HALFLIFE_MS: u64 = 7 * TIME_MS_PER_DAY;

/// Points of usage credit per recorded access
pub const SCORE_USAGE_POINTS_PER_ACCESS: f64 = 2.0;

// =============================================================================
// Pinning
// =============================================================================

/// Hard cap on pins per project
pub const PIN_LIMIT_PER_PROJECT_COUNT_MAX: usize = 50;

/// Maximum length of a pin reason
pub const PIN_REASON_BYTES_MAX: usize = 256;

/// Default number of pin suggestions
pub const PIN_SUGGESTIONS_COUNT_DEFAULT: usize = 10;

// =============================================================================
// Consolidation
// =============================================================================

/// Minimum group size before consolidation acts at all
pub const CONSOLIDATION_GROUP_SIZE_COUNT_MIN: usize = 5;

/// Memories younger than this are excluded from consolidation
pub const CONSOLIDATION_AGE_DAYS_MIN: u64 = 30;

/// Grouping time-window bucket
pub const CONSOLIDATION_GROUP_WINDOW_MS_DEFAULT: u64 = 7 * TIME_MS_PER_DAY;

/// Maximum distinct attempted-fix summaries joined into the fix line
pub const CONSOLIDATION_FIX_SUMMARIES_COUNT_MAX: usize = 5;

// =============================================================================
// Retention Policy — Rule Thresholds
// =============================================================================

/// LOW+NOISE count above which `ConsolidateAndDecay` fires
pub const POLICY_LOW_NOISE_THRESHOLD_DEFAULT: usize = 100;

/// Total count above which `CompressLight` fires
pub const POLICY_COMPRESS_LIGHT_THRESHOLD_DEFAULT: usize = 500;

/// Total count above which `CompressAggressive` fires
pub const POLICY_COMPRESS_AGGRESSIVE_THRESHOLD_DEFAULT: usize = 1000;

/// Oldest-memory age above which `DecayLowValue` fires
pub const POLICY_DECAY_AGE_DAYS_DEFAULT: u64 = 90;

// =============================================================================
// Retention Policy — Q-Learning
// =============================================================================

/// Learning rate (alpha)
pub const QLEARN_ALPHA: f64 = 0.1;

/// Discount factor (gamma)
pub const QLEARN_GAMMA: f64 = 0.9;

/// Initial exploration rate
pub const QLEARN_EPSILON_START: f64 = 0.30;

/// Exploration rate floor
pub const QLEARN_EPSILON_FLOOR: f64 = 0.05;

/// Episodes over which epsilon decays by a factor of e
pub const QLEARN_EPSILON_DECAY_EPISODES: f64 = 500.0;

/// Tokens-saved normalization divisor in the reward
pub const QLEARN_REWARD_TOKENS_SCALE: f64 = 1000.0;

// =============================================================================
// Ledger
// =============================================================================

/// Default number of ledger events returned by queries
pub const LEDGER_QUERY_LIMIT_DEFAULT: usize = 50;

/// Maximum length of a ledger reason
pub const LEDGER_REASON_BYTES_MAX: usize = 512;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = 86_400_000; // 24 hours

// =============================================================================
// Tests
// =============================================================================
