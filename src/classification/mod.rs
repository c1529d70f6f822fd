//! Role Classification - Narrative Role Detection
//!
//! `TigerStyle`: Data-driven rule table, fixed evaluation order, saturating
//! confidence.
//!
//! # Architecture
//!
//! ```text
//! RoleClassifier
//! ├── classify()        → Classification { role, confidence, keywords }
//! ├── classify_memory() → verbatim + gist combined
//! └── Ordered rule table: RESOLUTION → CAUSE → ATTEMPTED_FIX → CONTEXT,
//!     then noise patterns, then CONTEXT default (low confidence)
//! ```
//!
//! The evaluation order is significant and fixed: RESOLUTION outranks CAUSE
//! even when both keyword sets match, because a resolved cause is worth more
//! than an unresolved one. First matching rule wins.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CLASSIFY_CONFIDENCE_AMBIGUOUS, CLASSIFY_CONFIDENCE_BASE, CLASSIFY_CONFIDENCE_MAX,
    CLASSIFY_CONFIDENCE_NOISE, CLASSIFY_CONFIDENCE_PER_KEYWORD, CLASSIFY_NOISE_CHARS_MAX,
};

// =============================================================================
// Memory Role
// =============================================================================

/// Narrative role of a memory within a debugging/work episode.
///
/// `TigerStyle`: Exhaustive enum prevents invalid states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRole {
    /// The problem was solved; the most valuable role
    Resolution,
    /// A root cause was identified
    Cause,
    /// Something was tried, outcome unresolved
    AttemptedFix,
    /// Background information
    Context,
    /// No narrative value
    Noise,
}

impl MemoryRole {
    /// Fixed priority weight used by the retention scorer.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            MemoryRole::Resolution => 20,
            MemoryRole::Cause => 18,
            MemoryRole::AttemptedFix => 12,
            MemoryRole::Context => 8,
            MemoryRole::Noise => 0,
        }
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::Resolution => "resolution",
            MemoryRole::Cause => "cause",
            MemoryRole::AttemptedFix => "attempted_fix",
            MemoryRole::Context => "context",
            MemoryRole::Noise => "noise",
        }
    }

    /// Get all roles in priority order.
    #[must_use]
    pub fn all() -> &'static [MemoryRole] {
        &[
            MemoryRole::Resolution,
            MemoryRole::Cause,
            MemoryRole::AttemptedFix,
            MemoryRole::Context,
            MemoryRole::Noise,
        ]
    }
}

impl std::fmt::Display for MemoryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Classification Result
// =============================================================================

/// Result of classifying one memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Detected role
    pub role: MemoryRole,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    /// Keywords that fired for the winning rule
    pub keywords_matched: Vec<String>,
}

impl Classification {
    fn new(role: MemoryRole, confidence: f64, keywords_matched: Vec<String>) -> Self {
        assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence {confidence} outside [0.0, 1.0]"
        );
        Self {
            role,
            confidence,
            keywords_matched,
        }
    }

    /// Low-confidence default classification is not an error; this flags it
    /// for callers that want to treat ambiguity specially.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.role == MemoryRole::Context && self.keywords_matched.is_empty()
    }
}

// =============================================================================
// RoleClassifier
// =============================================================================

/// Keyword rule: the role it detects and the phrases that vote for it.
struct RoleRule {
    role: MemoryRole,
    keywords: &'static [&'static str],
}

/// Ordered rule table. Order is a design decision: first match wins, and
/// RESOLUTION must be checked before CAUSE.
const ROLE_RULES: &[RoleRule] = &[
    RoleRule {
        role: MemoryRole::Resolution,
        keywords: &[
            "fixed",
            "solved",
            "resolved",
            "working now",
            "works now",
            "fix was",
            "deployed",
            "tests pass",
            "now passing",
            "no longer failing",
        ],
    },
    RoleRule {
        role: MemoryRole::Cause,
        keywords: &[
            "root cause",
            "the issue is",
            "the problem is",
            "caused by",
            "because of",
            "due to",
            "the reason",
            "turned out",
        ],
    },
    RoleRule {
        role: MemoryRole::AttemptedFix,
        keywords: &[
            "tried",
            "trying",
            "attempted",
            "attempting",
            "testing",
            "debugging",
            "experimenting",
            "didn't work",
            "still failing",
            "no success",
        ],
    },
    RoleRule {
        role: MemoryRole::Context,
        keywords: &[
            "for context",
            "background",
            "note that",
            "related to",
            "fyi",
            "affects",
            "keep in mind",
        ],
    },
];

/// Pattern-based narrative role classifier.
///
/// Pure function of its input: no I/O, no state mutation, deterministic.
///
/// # Example
///
/// ```rust
/// use memshed::classification::{MemoryRole, RoleClassifier};
///
/// let classifier = RoleClassifier::new();
/// let result = classifier.classify("Fixed the JWT bug by normalizing timestamps");
///
/// assert_eq!(result.role, MemoryRole::Resolution);
/// assert!(result.confidence >= 0.7);
/// ```
#[derive(Debug, Default)]
pub struct RoleClassifier {}

impl RoleClassifier {
    /// Create a new classifier.
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }

    /// Classify text into a narrative role.
    ///
    /// Ambiguous text (no rule fires, no noise pattern) defaults to CONTEXT
    /// with low confidence; that is a valid result, not an error.
    #[must_use]
    pub fn classify(&self, text: &str) -> Classification {
        let haystack = text.to_lowercase();

        // Fixed-order keyword rules, first match wins.
        for rule in ROLE_RULES {
            let matched: Vec<String> = rule
                .keywords
                .iter()
                .filter(|kw| haystack.contains(*kw))
                .map(|kw| (*kw).to_string())
                .collect();

            if !matched.is_empty() {
                let confidence = saturating_confidence(matched.len());
                return Classification::new(rule.role, confidence, matched);
            }
        }

        // Known-noise patterns, only after every narrative rule declined.
        if is_noise(text) {
            return Classification::new(MemoryRole::Noise, CLASSIFY_CONFIDENCE_NOISE, Vec::new());
        }

        // Ambiguous default.
        Classification::new(
            MemoryRole::Context,
            CLASSIFY_CONFIDENCE_AMBIGUOUS,
            Vec::new(),
        )
    }

    /// Classify a memory using verbatim text plus its gist when present.
    ///
    /// A vague verbatim with a sharp gist classifies by the gist.
    #[must_use]
    pub fn classify_memory(&self, verbatim: &str, gist: Option<&str>) -> Classification {
        match gist {
            Some(gist) if !gist.trim().is_empty() => {
                let combined = format!("{verbatim}\n{gist}");
                self.classify(&combined)
            }
            _ => self.classify(verbatim),
        }
    }

    /// Classify a batch of texts.
    #[must_use]
    pub fn classify_batch(&self, texts: &[&str]) -> Vec<Classification> {
        texts.iter().map(|t| self.classify(t)).collect()
    }

    /// Priority weight for a role (scorer input).
    #[must_use]
    pub fn role_priority(&self, role: MemoryRole) -> u8 {
        role.priority()
    }

    /// Number of keywords per role in the rule table.
    #[must_use]
    pub fn pattern_counts(&self) -> Vec<(MemoryRole, usize)> {
        ROLE_RULES
            .iter()
            .map(|rule| (rule.role, rule.keywords.len()))
            .collect()
    }
}

/// Confidence from match count: base + per-keyword, saturating at the cap.
fn saturating_confidence(matched: usize) -> f64 {
    assert!(matched > 0, "saturating_confidence requires a match");
    let raw = CLASSIFY_CONFIDENCE_BASE + CLASSIFY_CONFIDENCE_PER_KEYWORD * matched as f64;
    raw.min(CLASSIFY_CONFIDENCE_MAX)
}

/// Known-noise patterns: effectively empty text, single filler tokens, and
/// bare stack dumps with no narrative around them.
fn is_noise(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let non_ws_chars = trimmed.chars().filter(|c| !c.is_whitespace()).count();
    if non_ws_chars <= CLASSIFY_NOISE_CHARS_MAX {
        return true;
    }

    if trimmed.split_whitespace().count() <= 1 {
        return true;
    }

    // Bare stack dump: most lines are frames, nothing narrates them.
    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() >= 2 {
        let frame_lines = lines
            .iter()
            .filter(|l| {
                let l = l.trim_start();
                l.starts_with("at ") || l.starts_with("File \"") || l.starts_with("Traceback")
            })
            .count();
        if frame_lines * 10 >= lines.len() * 8 {
            return true;
        }
    }

    false
}

// =============================================================================
// Tests
// =============================================================================
