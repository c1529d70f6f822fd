//! Extracted Entities - Set-Valued Technical Identifiers
//!
//! `TigerStyle`: Type-safe sets, deterministic iteration, no invalid states.
//!
//! Every class is a `BTreeSet` (or `BTreeMap` for valued entries), so
//! `merge` is plain set union: idempotent, commutative, associative by
//! construction. Downstream code treats "present in entities" as the
//! preservation oracle, which is what makes the zero-loss consolidation
//! guarantee checkable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// =============================================================================
// Stack Frame
// =============================================================================

/// A single stack-trace frame.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file of the frame
    pub file: String,
    /// Line number within the file
    pub line: u32,
    /// Function name, if the format carried one
    pub function: String,
}

impl StackFrame {
    /// Create a new stack frame.
    ///
    /// # Panics
    /// Panics if file is empty.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        let file = file.into();
        assert!(!file.is_empty(), "frame file must not be empty");

        Self {
            file,
            line,
            function: function.into(),
        }
    }
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} in {}", self.file, self.line, self.function)
    }
}

// =============================================================================
// Extracted Entities
// =============================================================================

/// Technical identifiers extracted from one or more memories.
///
/// `TigerStyle`: All classes are ordered sets, so equality and serialization
/// are deterministic regardless of extraction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// Error type names (`TypeError`, `ValueError`, ...)
    pub error_types: BTreeSet<String>,
    /// Full error messages following an error marker
    pub error_messages: BTreeSet<String>,
    /// Parsed stack-trace frames
    pub stack_frames: BTreeSet<StackFrame>,
    /// Function names
    pub function_names: BTreeSet<String>,
    /// Class names (CamelCase identifiers)
    pub class_names: BTreeSet<String>,
    /// Variable names (snake_case identifiers)
    pub variable_names: BTreeSet<String>,
    /// File paths
    pub file_paths: BTreeSet<String>,
    /// Line numbers referenced in prose or frames
    pub line_numbers: BTreeSet<u32>,
    /// Configuration keys (SCREAMING_SNAKE_CASE)
    pub config_keys: BTreeSet<String>,
    /// Environment variables with values (`NODE_ENV=production`)
    pub environment_vars: BTreeMap<String, String>,
    /// Database field references (`table.column`)
    pub database_fields: BTreeSet<String>,
    /// ISO 8601 timestamps
    pub timestamps: BTreeSet<String>,
    /// URLs
    pub urls: BTreeSet<String>,
    /// IPv4 addresses
    pub ip_addresses: BTreeSet<String>,
    /// Version strings (`1.2.3`, `2.0.0-beta`)
    pub version_numbers: BTreeSet<String>,
    /// Hash values (git SHAs and similar hex runs)
    pub hash_values: BTreeSet<String>,
}

impl ExtractedEntities {
    /// Create an empty entity set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another entity set into this one (set union per class).
    ///
    /// # Postconditions
    /// - `self` contains every entity of both inputs
    /// - merging the same set twice is a no-op (idempotent)
    pub fn merge(&mut self, other: &Self) {
        let count_before = self.count();

        self.error_types.extend(other.error_types.iter().cloned());
        self.error_messages
            .extend(other.error_messages.iter().cloned());
        self.stack_frames.extend(other.stack_frames.iter().cloned());
        self.function_names
            .extend(other.function_names.iter().cloned());
        self.class_names.extend(other.class_names.iter().cloned());
        self.variable_names
            .extend(other.variable_names.iter().cloned());
        self.file_paths.extend(other.file_paths.iter().cloned());
        self.line_numbers.extend(other.line_numbers.iter());
        self.config_keys.extend(other.config_keys.iter().cloned());
        for (name, value) in &other.environment_vars {
            self.environment_vars
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self.database_fields
            .extend(other.database_fields.iter().cloned());
        self.timestamps.extend(other.timestamps.iter().cloned());
        self.urls.extend(other.urls.iter().cloned());
        self.ip_addresses.extend(other.ip_addresses.iter().cloned());
        self.version_numbers
            .extend(other.version_numbers.iter().cloned());
        self.hash_values.extend(other.hash_values.iter().cloned());

        assert!(
            self.count() >= count_before,
            "merge must never lose entities"
        );
    }

    /// Merge, consuming self (builder-friendly form).
    #[must_use]
    pub fn merged(mut self, other: &Self) -> Self {
        self.merge(other);
        self
    }

    /// Union over many entity sets.
    #[must_use]
    pub fn union_of<'a>(sets: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut merged = Self::new();
        for set in sets {
            merged.merge(set);
        }
        merged
    }

    /// Total number of entities across all classes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.error_types.len()
            + self.error_messages.len()
            + self.stack_frames.len()
            + self.function_names.len()
            + self.class_names.len()
            + self.variable_names.len()
            + self.file_paths.len()
            + self.line_numbers.len()
            + self.config_keys.len()
            + self.environment_vars.len()
            + self.database_fields.len()
            + self.timestamps.len()
            + self.urls.len()
            + self.ip_addresses.len()
            + self.version_numbers.len()
            + self.hash_values.len()
    }

    /// Check whether no entities were extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Compact single-line rendering for gists and ledger reasons.
    ///
    /// Format: `TypeError | auth.py:42 | validateToken() | jwt_timestamp`
    #[must_use]
    pub fn to_compact_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.extend(self.error_types.iter().cloned());

        // Pair the first file with the lowest line number when both exist,
        // otherwise list files bare.
        if let Some(file) = self.file_paths.iter().next() {
            if let Some(line) = self.line_numbers.iter().next() {
                parts.push(format!("{file}:{line}"));
            } else {
                parts.push(file.clone());
            }
            parts.extend(self.file_paths.iter().skip(1).cloned());
        }

        parts.extend(self.function_names.iter().map(|f| format!("{f}()")));
        parts.extend(self.variable_names.iter().cloned());
        parts.extend(self.config_keys.iter().cloned());
        parts.extend(self.urls.iter().cloned());

        parts.join(" | ")
    }
}

// =============================================================================
// Tests
// =============================================================================
