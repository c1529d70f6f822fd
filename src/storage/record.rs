//! Memory Record - The Atomic Unit of Retention
//!
//! `TigerStyle`: Explicit types, validation, builder pattern.

use serde::{Deserialize, Serialize};

use crate::classification::MemoryRole;
use crate::constants::{
    MEMORY_GIST_BYTES_MAX, MEMORY_TAGS_COUNT_MAX, MEMORY_TEXT_BYTES_MAX,
    MEMORY_TOKEN_ESTIMATE_BYTES, TIME_MS_PER_DAY,
};
use crate::extraction::ExtractedEntities;

// =============================================================================
// Salience
// =============================================================================

/// Ordinal importance tier of a memory.
///
/// `TigerStyle`: Exhaustive enum; variant order defines the ordinal ordering
/// (`Noise < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Salience {
    /// No retention value (weight 5)
    Noise,
    /// Low value (weight 25)
    Low,
    /// Default tier (weight 50)
    Medium,
    /// Important (weight 75)
    High,
    /// Must keep (weight 100)
    Critical,
}

impl Salience {
    /// Numeric weight of the tier.
    #[must_use]
    pub fn weight(&self) -> u8 {
        match self {
            Salience::Critical => 100,
            Salience::High => 75,
            Salience::Medium => 50,
            Salience::Low => 25,
            Salience::Noise => 5,
        }
    }

    /// One tier down; NOISE stays NOISE.
    #[must_use]
    pub fn tier_down(&self) -> Salience {
        match self {
            Salience::Critical => Salience::High,
            Salience::High => Salience::Medium,
            Salience::Medium => Salience::Low,
            Salience::Low | Salience::Noise => Salience::Noise,
        }
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Salience::Critical => "critical",
            Salience::High => "high",
            Salience::Medium => "medium",
            Salience::Low => "low",
            Salience::Noise => "noise",
        }
    }

    /// Get all tiers from highest to lowest.
    #[must_use]
    pub fn all() -> &'static [Salience] {
        &[
            Salience::Critical,
            Salience::High,
            Salience::Medium,
            Salience::Low,
            Salience::Noise,
        ]
    }
}

impl std::fmt::Display for Salience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Memory Record
// =============================================================================

/// The atomic retention unit.
///
/// Created by the ingestion boundary, mutated in place by the aggregator
/// (occurrence/salience) and the scorer (retention score), and replaced —
/// never silently deleted — by consolidation, which must write a ledger
/// entry recording what it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque identifier assigned by storage (empty until stored)
    pub id: String,
    /// Original text (superseded by a compressed form after consolidation)
    pub verbatim: String,
    /// Canonical short summary
    pub gist: String,
    /// Importance tier
    pub salience: Salience,
    /// Narrative role
    pub role: MemoryRole,
    /// Extracted technical identifiers
    pub entities: ExtractedEntities,
    /// Pinned memories are excluded from every mutating operation
    pub pinned: bool,
    /// Aggregation counter (>= 1)
    pub occurrence_count: u32,
    /// Number of recorded accesses
    pub access_count: u32,
    /// Last access time (epoch ms)
    pub last_accessed_ms: u64,
    /// Creation time (epoch ms)
    pub created_at_ms: u64,
    /// Decay eligibility time (epoch ms), per-tier retention window
    pub expires_at_ms: Option<u64>,
    /// Source file the memory refers to
    pub file_path: Option<String>,
    /// Source line, when known
    pub line_number: Option<u32>,
    /// Owning project
    pub project_path: String,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Retention score stored alongside the record
    pub retention_score: f64,
}

impl MemoryRecord {
    /// Start building a record.
    #[must_use]
    pub fn builder(
        project_path: impl Into<String>,
        verbatim: impl Into<String>,
        created_at_ms: u64,
    ) -> MemoryRecordBuilder {
        MemoryRecordBuilder::new(project_path, verbatim, created_at_ms)
    }

    /// Age in milliseconds at `now_ms`.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    /// Age in whole days at `now_ms`.
    #[must_use]
    pub fn age_days(&self, now_ms: u64) -> u64 {
        self.age_ms(now_ms) / TIME_MS_PER_DAY
    }

    /// Whether the retention window has elapsed at `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|e| e <= now_ms)
    }

    /// Rough token volume of the stored text.
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        (self.verbatim.len() + self.gist.len()) / MEMORY_TOKEN_ESTIMATE_BYTES
    }

    /// Record an access at `now_ms`.
    pub fn touch(&mut self, now_ms: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_ms = now_ms;
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`MemoryRecord`].
///
/// `TigerStyle`: Fluent `with_*` methods, sensible defaults, validation at
/// build. Oversized verbatim is truncated at a char boundary rather than
/// rejected — malformed input must not be able to drop a memory.
#[derive(Debug)]
pub struct MemoryRecordBuilder {
    record: MemoryRecord,
    explicit_gist: bool,
}

impl MemoryRecordBuilder {
    fn new(project_path: impl Into<String>, verbatim: impl Into<String>, created_at_ms: u64) -> Self {
        let project_path = project_path.into();
        assert!(!project_path.is_empty(), "project_path must not be empty");

        let mut verbatim = verbatim.into();
        if verbatim.len() > MEMORY_TEXT_BYTES_MAX {
            let mut end = MEMORY_TEXT_BYTES_MAX;
            while end > 0 && !verbatim.is_char_boundary(end) {
                end -= 1;
            }
            verbatim.truncate(end);
        }

        Self {
            record: MemoryRecord {
                id: String::new(),
                verbatim,
                gist: String::new(),
                salience: Salience::Medium,
                role: MemoryRole::Context,
                entities: ExtractedEntities::new(),
                pinned: false,
                occurrence_count: 1,
                access_count: 0,
                last_accessed_ms: created_at_ms,
                created_at_ms,
                expires_at_ms: None,
                file_path: None,
                line_number: None,
                project_path,
                tags: Vec::new(),
                retention_score: 0.0,
            },
            explicit_gist: false,
        }
    }

    /// Set an explicit gist (default: derived from the verbatim first line).
    #[must_use]
    pub fn with_gist(mut self, gist: impl Into<String>) -> Self {
        self.record.gist = gist.into();
        self.explicit_gist = true;
        self
    }

    /// Set the salience tier.
    #[must_use]
    pub fn with_salience(mut self, salience: Salience) -> Self {
        self.record.salience = salience;
        self
    }

    /// Set the narrative role.
    #[must_use]
    pub fn with_role(mut self, role: MemoryRole) -> Self {
        self.record.role = role;
        self
    }

    /// Set the extracted entities.
    #[must_use]
    pub fn with_entities(mut self, entities: ExtractedEntities) -> Self {
        self.record.entities = entities;
        self
    }

    /// Set the source file path.
    #[must_use]
    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.record.file_path = Some(file_path.into());
        self
    }

    /// Set the source line number.
    #[must_use]
    pub fn with_line_number(mut self, line_number: u32) -> Self {
        self.record.line_number = Some(line_number);
        self
    }

    /// Set the expiry time.
    #[must_use]
    pub fn with_expires_at_ms(mut self, expires_at_ms: u64) -> Self {
        self.record.expires_at_ms = Some(expires_at_ms);
        self
    }

    /// Set tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        assert!(
            tags.len() <= MEMORY_TAGS_COUNT_MAX,
            "{} tags exceeds max {}",
            tags.len(),
            MEMORY_TAGS_COUNT_MAX
        );
        self.record.tags = tags;
        self
    }

    /// Set the occurrence count.
    #[must_use]
    pub fn with_occurrence_count(mut self, count: u32) -> Self {
        assert!(count >= 1, "occurrence_count must be >= 1");
        self.record.occurrence_count = count;
        self
    }

    /// Set the stored retention score.
    #[must_use]
    pub fn with_retention_score(mut self, score: f64) -> Self {
        self.record.retention_score = score;
        self
    }

    /// Mark pinned.
    #[must_use]
    pub fn pinned(mut self, pinned: bool) -> Self {
        self.record.pinned = pinned;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(mut self) -> MemoryRecord {
        if !self.explicit_gist {
            self.record.gist = derive_gist(&self.record.verbatim);
        }

        // Postconditions
        assert!(self.record.occurrence_count >= 1, "occurrence must be >= 1");
        assert!(
            self.record.gist.len() <= MEMORY_GIST_BYTES_MAX,
            "gist exceeds max bytes"
        );

        self.record
    }
}

/// Derive a gist: first non-empty line, truncated at a char boundary.
fn derive_gist(verbatim: &str) -> String {
    let first_line = verbatim
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let mut gist = first_line.to_string();
    if gist.len() > MEMORY_GIST_BYTES_MAX {
        let mut end = MEMORY_GIST_BYTES_MAX;
        while end > 0 && !gist.is_char_boundary(end) {
            end -= 1;
        }
        gist.truncate(end);
    }
    gist
}

// =============================================================================
// Tests
// =============================================================================
