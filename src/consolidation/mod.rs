//! Semantic Consolidation - Lossless Group Compression
//!
//! `TigerStyle`: Pure synthesis over a snapshot; storage effects stay with
//! the engine so a failed replace can never leave partial state here.
//!
//! # Architecture
//!
//! ```text
//! ConsolidationEngine
//! ├── eligible()          → unpinned, low-tier, old-enough records
//! ├── plan()              → groups by (file_path, time window)
//! └── consolidate_group() → CompressedMemory | Skipped
//!       1. classify every member        (RoleClassifier)
//!       2. extract + merge entities     (lossless union)
//!       3. select representatives       (best CAUSE / fixes / RESOLUTION)
//!       4. synthesize cause/fix/result/learning
//! ```
//!
//! The merged entity set is exactly the union of per-member extractions;
//! that equality is the zero-loss guarantee this subsystem exists to uphold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classification::{MemoryRole, RoleClassifier};
use crate::constants::{
    CONSOLIDATION_AGE_DAYS_MIN, CONSOLIDATION_FIX_SUMMARIES_COUNT_MAX,
    CONSOLIDATION_GROUP_SIZE_COUNT_MIN, CONSOLIDATION_GROUP_WINDOW_MS_DEFAULT, TIME_MS_PER_DAY,
};
use crate::dst::SimClock;
use crate::extraction::{EntityExtractor, ExtractedEntities};
use crate::storage::{MemoryRecord, Salience};

// =============================================================================
// Config
// =============================================================================

/// Tunable consolidation parameters.
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Only records at or below this tier are eligible
    pub eligible_salience_max: Salience,
    /// Records younger than this many days are excluded
    pub min_age_days: u64,
    /// Groups below this size are left untouched
    pub min_group_size: usize,
    /// Width of the grouping time bucket
    pub group_window_ms: u64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            eligible_salience_max: Salience::Low,
            min_age_days: CONSOLIDATION_AGE_DAYS_MIN,
            min_group_size: CONSOLIDATION_GROUP_SIZE_COUNT_MIN,
            group_window_ms: CONSOLIDATION_GROUP_WINDOW_MS_DEFAULT,
        }
    }
}

impl ConsolidationConfig {
    /// Light compression: defaults (LOW/NOISE only, 30-day minimum age).
    #[must_use]
    pub fn light() -> Self {
        Self::default()
    }

    /// Aggressive compression: MEDIUM and below, 7-day minimum age.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            eligible_salience_max: Salience::Medium,
            min_age_days: 7,
            ..Self::default()
        }
    }

    fn validate(&self) {
        assert!(self.min_group_size >= 2, "min_group_size must be >= 2");
        assert!(self.group_window_ms > 0, "group_window_ms must be > 0");
    }
}

// =============================================================================
// Compressed Memory
// =============================================================================

/// Output of consolidating one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedMemory {
    /// Root cause statement
    pub cause: String,
    /// What was tried and what resolved it
    pub fix: String,
    /// "Fixed" or "Ongoing/unresolved"
    pub result: String,
    /// Pattern statement worth keeping
    pub learning: String,
    /// Lossless union of every member's entities
    pub entities: ExtractedEntities,
    /// Sum of member occurrence counts
    pub occurrence_count: u32,
    /// Earliest member creation time
    pub first_timestamp_ms: u64,
    /// Latest member creation time
    pub last_timestamp_ms: u64,
    /// Shared file path of the group
    pub file_path: Option<String>,
    /// Member count per narrative role
    pub role_distribution: BTreeMap<MemoryRole, usize>,
    /// Ids of the replaced members (recorded in the ledger, never lost)
    pub source_ids: Vec<String>,
}

impl CompressedMemory {
    /// Number of source memories represented.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.source_ids.len()
    }

    /// CAUSE members represented.
    #[must_use]
    pub fn root_causes_preserved(&self) -> usize {
        self.role_distribution
            .get(&MemoryRole::Cause)
            .copied()
            .unwrap_or(0)
    }

    /// RESOLUTION members represented.
    #[must_use]
    pub fn resolutions_preserved(&self) -> usize {
        self.role_distribution
            .get(&MemoryRole::Resolution)
            .copied()
            .unwrap_or(0)
    }

    /// Render into the replacement record stored in place of the group.
    #[must_use]
    pub fn into_record(&self, project: &str, now_ms: u64) -> MemoryRecord {
        let verbatim = format!(
            "[Consolidated from {} memories]\n\nCause: {}\nFix: {}\nResult: {}\nLearning: {}\n\nTechnical: {}",
            self.source_count(),
            self.cause,
            self.fix,
            self.result,
            self.learning,
            self.entities.to_compact_string(),
        );

        let gist = format!("{} ({})", self.cause, self.result);

        let resolved = self.resolutions_preserved() > 0;
        let mut builder = MemoryRecord::builder(project, verbatim, now_ms)
            .with_gist(truncated_gist(&gist))
            .with_salience(if resolved { Salience::Medium } else { Salience::Low })
            .with_role(if resolved {
                MemoryRole::Resolution
            } else {
                MemoryRole::Context
            })
            .with_entities(self.entities.clone())
            .with_occurrence_count(self.occurrence_count.max(1))
            .with_tags(vec!["consolidated".to_string()]);

        if let Some(file_path) = &self.file_path {
            builder = builder.with_file_path(file_path.clone());
        }

        builder.build()
    }
}

fn truncated_gist(gist: &str) -> String {
    let mut gist = gist.to_string();
    let max = crate::constants::MEMORY_GIST_BYTES_MAX;
    if gist.len() > max {
        let mut end = max;
        while end > 0 && !gist.is_char_boundary(end) {
            end -= 1;
        }
        gist.truncate(end);
    }
    gist
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of attempting to consolidate one group.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidationOutcome {
    /// The group synthesized into one compressed record
    Consolidated(Box<CompressedMemory>),
    /// The group was left untouched
    Skipped {
        /// Why nothing happened
        reason: SkipReason,
    },
}

/// Why a group was not consolidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer members than `min_group_size`
    GroupTooSmall {
        /// Actual group size
        size: usize,
        /// Required minimum
        required: usize,
    },
}

// =============================================================================
// Consolidation Engine
// =============================================================================

/// Groups eligible memories and synthesizes compressed records.
#[derive(Debug)]
pub struct ConsolidationEngine {
    classifier: RoleClassifier,
    extractor: EntityExtractor,
    config: ConsolidationConfig,
    clock: SimClock,
}

impl ConsolidationEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(clock: SimClock, config: ConsolidationConfig) -> Self {
        config.validate();
        Self {
            classifier: RoleClassifier::new(),
            extractor: EntityExtractor::new(),
            config,
            clock,
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Eligibility filter: unpinned, at or below the salience floor, old
    /// enough.
    #[must_use]
    pub fn eligible<'a>(&self, records: &'a [MemoryRecord]) -> Vec<&'a MemoryRecord> {
        let now_ms = self.clock.now_ms();
        let min_age_ms = self.config.min_age_days * TIME_MS_PER_DAY;

        records
            .iter()
            .filter(|r| !r.pinned)
            .filter(|r| r.salience <= self.config.eligible_salience_max)
            .filter(|r| r.age_ms(now_ms) >= min_age_ms)
            .collect()
    }

    /// Group eligible records by `(file_path, time window)` and keep groups
    /// meeting the minimum size. Groups come back in deterministic order.
    #[must_use]
    pub fn plan(&self, records: &[MemoryRecord]) -> Vec<Vec<MemoryRecord>> {
        let eligible = self.eligible(records);

        let mut groups: BTreeMap<(String, u64), Vec<MemoryRecord>> = BTreeMap::new();
        for record in eligible {
            let file_key = record.file_path.clone().unwrap_or_else(|| "-".to_string());
            let window = record.created_at_ms / self.config.group_window_ms;
            groups
                .entry((file_key, window))
                .or_default()
                .push(record.clone());
        }

        groups
            .into_values()
            .filter(|group| group.len() >= self.config.min_group_size)
            .map(|mut group| {
                group.sort_by(|a, b| {
                    a.created_at_ms
                        .cmp(&b.created_at_ms)
                        .then_with(|| a.id.cmp(&b.id))
                });
                group
            })
            .collect()
    }

    /// Consolidate one group into a compressed record.
    ///
    /// # Preconditions
    /// - no member is pinned (the eligibility filter removes them; a pinned
    ///   member reaching this point is a bug)
    #[must_use]
    pub fn consolidate_group(&self, group: &[MemoryRecord]) -> ConsolidationOutcome {
        assert!(
            group.iter().all(|r| !r.pinned),
            "pinned memory reached consolidation"
        );

        if group.len() < self.config.min_group_size {
            return ConsolidationOutcome::Skipped {
                reason: SkipReason::GroupTooSmall {
                    size: group.len(),
                    required: self.config.min_group_size,
                },
            };
        }

        // Classify and extract every member; merge entities losslessly.
        let mut merged = ExtractedEntities::new();
        let mut classified = Vec::with_capacity(group.len());
        let mut extractions = Vec::with_capacity(group.len());
        let mut role_distribution: BTreeMap<MemoryRole, usize> = BTreeMap::new();

        for record in group {
            let classification = self
                .classifier
                .classify_memory(&record.verbatim, Some(&record.gist));
            let entities = self.extractor.extract(&record.verbatim);
            merged.merge(&entities);
            extractions.push(entities);
            *role_distribution.entry(classification.role).or_insert(0) += 1;
            classified.push((record, classification));
        }

        // Representatives: highest-confidence CAUSE, all ATTEMPTED_FIX,
        // highest-confidence RESOLUTION. Ties keep the earliest member.
        let best_cause = first_best(&classified, MemoryRole::Cause);

        let attempted_fixes: Vec<&MemoryRecord> = classified
            .iter()
            .filter(|(_, c)| c.role == MemoryRole::AttemptedFix)
            .map(|(r, _)| *r)
            .collect();

        let best_resolution = first_best(&classified, MemoryRole::Resolution);

        let cause = synthesize_cause(best_cause, &merged);
        let fix = synthesize_fix(&attempted_fixes, best_resolution);
        let result = if best_resolution.is_some() {
            "Fixed".to_string()
        } else {
            "Ongoing/unresolved".to_string()
        };
        let learning = synthesize_learning(group, &extractions, &merged, best_resolution);

        let compressed = CompressedMemory {
            cause,
            fix,
            result,
            learning,
            entities: merged,
            occurrence_count: group.iter().map(|r| r.occurrence_count).sum(),
            first_timestamp_ms: group.iter().map(|r| r.created_at_ms).min().unwrap_or(0),
            last_timestamp_ms: group.iter().map(|r| r.created_at_ms).max().unwrap_or(0),
            file_path: group[0].file_path.clone(),
            role_distribution,
            source_ids: group.iter().map(|r| r.id.clone()).collect(),
        };

        // Postcondition: the zero-loss guarantee.
        debug_assert_eq!(
            compressed.entities,
            ExtractedEntities::union_of(extractions.iter()),
            "merged entities must equal the union of member extractions"
        );

        ConsolidationOutcome::Consolidated(Box::new(compressed))
    }
}

// =============================================================================
// Synthesis
// =============================================================================

/// First member with the highest confidence for `role`.
fn first_best<'a>(
    classified: &[(&'a MemoryRecord, crate::classification::Classification)],
    role: MemoryRole,
) -> Option<&'a MemoryRecord> {
    let mut best: Option<(&'a MemoryRecord, f64)> = None;
    for (record, classification) in classified {
        if classification.role != role {
            continue;
        }
        let better = best.map_or(true, |(_, conf)| classification.confidence > conf);
        if better {
            best = Some((*record, classification.confidence));
        }
    }
    best.map(|(record, _)| record)
}

fn synthesize_cause(best_cause: Option<&MemoryRecord>, merged: &ExtractedEntities) -> String {
    if let Some(cause) = best_cause {
        return cause.gist.clone();
    }

    if !merged.error_types.is_empty() {
        let types: Vec<&str> = merged.error_types.iter().map(String::as_str).collect();
        return format!("Recurring {}", types.join("/"));
    }

    "Unknown cause".to_string()
}

fn synthesize_fix(
    attempted_fixes: &[&MemoryRecord],
    best_resolution: Option<&MemoryRecord>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for attempt in attempted_fixes {
        if seen.insert(attempt.gist.clone()) {
            parts.push(attempt.gist.clone());
        }
        if parts.len() >= CONSOLIDATION_FIX_SUMMARIES_COUNT_MAX {
            break;
        }
    }

    if let Some(resolution) = best_resolution {
        parts.push(resolution.gist.clone());
    }

    if parts.is_empty() {
        "No fix recorded".to_string()
    } else {
        parts.join("; ")
    }
}

fn synthesize_learning(
    group: &[MemoryRecord],
    extractions: &[ExtractedEntities],
    merged: &ExtractedEntities,
    best_resolution: Option<&MemoryRecord>,
) -> String {
    // Repeated error types dominate: the pattern is the lesson.
    for error_type in &merged.error_types {
        let occurrences = group
            .iter()
            .zip(extractions)
            .filter(|(_, entities)| entities.error_types.contains(error_type))
            .map(|(record, _)| record.occurrence_count as usize)
            .sum::<usize>();
        if occurrences >= 2 {
            return format!("Recurring {error_type} pattern ({occurrences} occurrences)");
        }
    }

    if let Some(resolution) = best_resolution {
        return resolution.gist.clone();
    }

    "No clear pattern".to_string()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIME_MS_PER_DAY;

    const OLD_MS: u64 = 0; // created at epoch
    const NOW_MS: u64 = 60 * TIME_MS_PER_DAY; // 60 days later

    fn engine() -> ConsolidationEngine {
        ConsolidationEngine::new(SimClock::at_ms(NOW_MS), ConsolidationConfig::default())
    }

    fn record(id: &str, text: &str, salience: Salience, created_ms: u64) -> MemoryRecord {
        let mut r = MemoryRecord::builder("/proj", text, created_ms)
            .with_salience(salience)
            .with_file_path("main.py")
            .build();
        r.id = id.to_string();
        r
    }

    fn debugging_session() -> Vec<MemoryRecord> {
        vec![
            record(
                "m1",
                "TypeError in auth.py: Cannot read property exp of undefined",
                Salience::Low,
                OLD_MS,
            ),
            record(
                "m2",
                "Root cause: JWT timestamp mismatch between UNIX and ISO formats",
                Salience::Low,
                OLD_MS + 1,
            ),
            record(
                "m3",
                "Tried converting timestamps to UTC - still failing",
                Salience::Low,
                OLD_MS + 2,
            ),
            record(
                "m4",
                "Attempted datetime normalization - didn't work",
                Salience::Low,
                OLD_MS + 3,
            ),
            record(
                "m5",
                "Fixed by using consistent UNIX timestamp conversion in validateToken()",
                Salience::Low,
                OLD_MS + 4,
            ),
            record("m6", "Tests pass - authentication stable", Salience::Low, OLD_MS + 5),
        ]
    }

    #[test]
    fn test_eligibility_filters() {
        let eng = engine();

        let mut pinned = record("p", "old noise", Salience::Noise, OLD_MS);
        pinned.pinned = true;
        let high = record("h", "important", Salience::High, OLD_MS);
        let young = record("y", "new noise", Salience::Noise, NOW_MS - TIME_MS_PER_DAY);
        let ok = record("ok", "old noise", Salience::Noise, OLD_MS);

        let records = vec![pinned, high, young, ok];
        let eligible = eng.eligible(&records);

        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "ok");
    }

    #[test]
    fn test_plan_groups_by_file_and_window() {
        let eng = engine();

        let mut records = Vec::new();
        for i in 0..6 {
            records.push(record(&format!("a{i}"), "noise entry", Salience::Low, OLD_MS + i));
        }
        // Different file: its own group, too small to act on
        let mut other = record("b0", "noise entry", Salience::Low, OLD_MS);
        other.file_path = Some("other.py".to_string());
        records.push(other);

        let groups = eng.plan(&records);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 6);
        assert!(groups[0].iter().all(|r| r.file_path.as_deref() == Some("main.py")));
    }

    #[test]
    fn test_plan_splits_distant_windows() {
        let eng = engine();

        let mut records = Vec::new();
        for i in 0..5 {
            records.push(record(&format!("w1-{i}"), "noise", Salience::Low, OLD_MS + i));
        }
        for i in 0..5 {
            records.push(record(
                &format!("w2-{i}"),
                "noise",
                Salience::Low,
                OLD_MS + 14 * TIME_MS_PER_DAY + i,
            ));
        }

        let groups = eng.plan(&records);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_small_group_skipped() {
        let eng = engine();
        let group: Vec<MemoryRecord> = (0..4)
            .map(|i| record(&format!("m{i}"), "noise", Salience::Low, OLD_MS))
            .collect();

        let outcome = eng.consolidate_group(&group);

        assert_eq!(
            outcome,
            ConsolidationOutcome::Skipped {
                reason: SkipReason::GroupTooSmall {
                    size: 4,
                    required: CONSOLIDATION_GROUP_SIZE_COUNT_MIN,
                }
            }
        );
    }

    #[test]
    fn test_consolidate_debugging_session() {
        let eng = engine();
        let group = debugging_session();

        let ConsolidationOutcome::Consolidated(compressed) = eng.consolidate_group(&group) else {
            panic!("expected consolidation");
        };

        assert_eq!(compressed.source_count(), 6);
        assert!(compressed.cause.contains("JWT timestamp mismatch"));
        assert!(compressed.fix.contains("Tried converting timestamps"));
        assert!(compressed.fix.contains("Fixed by using consistent UNIX"));
        assert_eq!(compressed.result, "Fixed");
        assert_eq!(compressed.resolutions_preserved(), 2); // m5 and m6
        assert_eq!(compressed.root_causes_preserved(), 1);
        assert_eq!(compressed.first_timestamp_ms, OLD_MS);
        assert_eq!(compressed.last_timestamp_ms, OLD_MS + 5);
        assert_eq!(compressed.file_path.as_deref(), Some("main.py"));
    }

    #[test]
    fn test_entities_are_lossless_union() {
        let eng = engine();
        let extractor = EntityExtractor::new();
        let group = debugging_session();

        let ConsolidationOutcome::Consolidated(compressed) = eng.consolidate_group(&group) else {
            panic!("expected consolidation");
        };

        let expected = ExtractedEntities::union_of(
            group
                .iter()
                .map(|r| extractor.extract(&r.verbatim))
                .collect::<Vec<_>>()
                .iter(),
        );

        assert_eq!(compressed.entities, expected);
        assert!(compressed.entities.error_types.contains("TypeError"));
        assert!(compressed.entities.function_names.contains("validateToken"));
    }

    #[test]
    fn test_unresolved_group() {
        let eng = engine();
        let group: Vec<MemoryRecord> = (0..5)
            .map(|i| {
                record(
                    &format!("m{i}"),
                    "TypeError: Cannot read property exp of undefined",
                    Salience::Low,
                    OLD_MS + i,
                )
            })
            .collect();

        let ConsolidationOutcome::Consolidated(compressed) = eng.consolidate_group(&group) else {
            panic!("expected consolidation");
        };

        assert_eq!(compressed.result, "Ongoing/unresolved");
        assert_eq!(compressed.resolutions_preserved(), 0);
        assert!(compressed.cause.contains("TypeError"));
        assert!(compressed.learning.contains("Recurring TypeError"));
        assert_eq!(compressed.fix, "No fix recorded");
    }

    #[test]
    fn test_occurrence_counts_sum() {
        let eng = engine();
        let mut group = debugging_session();
        group[0].occurrence_count = 10;
        group[1].occurrence_count = 3;

        let ConsolidationOutcome::Consolidated(compressed) = eng.consolidate_group(&group) else {
            panic!("expected consolidation");
        };

        assert_eq!(compressed.occurrence_count, 10 + 3 + 4);
    }

    #[test]
    fn test_into_record() {
        let eng = engine();
        let group = debugging_session();

        let ConsolidationOutcome::Consolidated(compressed) = eng.consolidate_group(&group) else {
            panic!("expected consolidation");
        };

        let replacement = compressed.into_record("/proj", NOW_MS);

        assert!(replacement.verbatim.starts_with("[Consolidated from 6 memories]"));
        assert!(replacement.verbatim.contains("Cause:"));
        assert!(replacement.verbatim.contains("Result: Fixed"));
        assert_eq!(replacement.salience, Salience::Medium);
        assert_eq!(replacement.role, MemoryRole::Resolution);
        assert_eq!(replacement.entities, compressed.entities);
        assert!(replacement.tags.contains(&"consolidated".to_string()));
        assert_eq!(replacement.project_path, "/proj");
    }

    #[test]
    fn test_aggressive_config_widens_eligibility() {
        let eng = ConsolidationEngine::new(
            SimClock::at_ms(NOW_MS),
            ConsolidationConfig::aggressive(),
        );

        let medium = record("m", "routine entry", Salience::Medium, OLD_MS);
        let records = vec![medium];

        assert_eq!(eng.eligible(&records).len(), 1);
    }

    #[test]
    #[should_panic(expected = "pinned memory reached consolidation")]
    fn test_pinned_member_panics() {
        let eng = engine();
        let mut group = debugging_session();
        group[2].pinned = true;

        let _ = eng.consolidate_group(&group);
    }

    #[test]
    fn test_consolidation_deterministic() {
        let eng = engine();
        let group = debugging_session();

        let a = eng.consolidate_group(&group);
        let b = eng.consolidate_group(&group);
        assert_eq!(a, b);
    }
}
