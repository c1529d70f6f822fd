//! Pinning - User-Protected Memories
//!
//! `TigerStyle`: Hard caps fail loudly; protected records are never eligible
//! for any mutating retention operation.
//!
//! Pinning generalizes the protected-entity rule from eviction policies:
//! where an eviction policy refuses to select protected entity types, every
//! retention operation here refuses to select pinned memory ids.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classification::MemoryRole;
use crate::constants::{PIN_LIMIT_PER_PROJECT_COUNT_MAX, PIN_REASON_BYTES_MAX};
use crate::scoring::RetentionScore;
use crate::storage::{MemoryRecord, Salience};

// =============================================================================
// Errors
// =============================================================================

/// Errors from pin operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PinError {
    /// The per-project cap was reached; no mutation was performed.
    #[error("pin limit exceeded for {project}: {limit} pins")]
    LimitExceeded {
        /// Project whose cap was hit
        project: String,
        /// The cap value
        limit: usize,
    },

    /// The id is already pinned in this project.
    #[error("memory already pinned: {id}")]
    AlreadyPinned {
        /// Offending id
        id: String,
    },

    /// Unpin of an id that is not pinned.
    #[error("memory not pinned: {id}")]
    NotPinned {
        /// Offending id
        id: String,
    },
}

// =============================================================================
// Pin Record
// =============================================================================

/// One pin with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    /// Pinned memory id
    pub memory_id: String,
    /// Why the user pinned it
    pub reason: String,
    /// Pin time (epoch ms)
    pub pinned_at_ms: u64,
}

/// A suggestion produced by [`PinRegistry::suggest`].
#[derive(Debug, Clone, PartialEq)]
pub struct PinCandidate {
    /// Candidate memory id
    pub memory_id: String,
    /// Candidate gist for display
    pub gist: String,
    /// Retention score backing the ranking
    pub score: f64,
}

// =============================================================================
// Pin Registry
// =============================================================================

/// Tracks user pins per project and enforces the hard cap.
#[derive(Debug)]
pub struct PinRegistry {
    limit_per_project: usize,
    pins: HashMap<String, HashMap<String, PinRecord>>,
}

impl Default for PinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PinRegistry {
    /// Create a registry with the default per-project cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(PIN_LIMIT_PER_PROJECT_COUNT_MAX)
    }

    /// Create a registry with an explicit per-project cap.
    ///
    /// # Preconditions
    /// - `limit` must be > 0
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        assert!(limit > 0, "pin limit must be > 0");
        Self {
            limit_per_project: limit,
            pins: HashMap::new(),
        }
    }

    /// Pin a memory.
    ///
    /// Pinning beyond the cap fails loudly rather than silently evicting an
    /// existing pin.
    ///
    /// # Errors
    /// `LimitExceeded` when the project cap is reached, `AlreadyPinned` for
    /// a duplicate pin. Neither mutates the registry.
    pub fn pin(
        &mut self,
        project: &str,
        memory_id: &str,
        reason: &str,
        now_ms: u64,
    ) -> Result<(), PinError> {
        assert!(!project.is_empty(), "project must not be empty");
        assert!(!memory_id.is_empty(), "memory_id must not be empty");

        let project_pins = self.pins.entry(project.to_string()).or_default();

        if project_pins.contains_key(memory_id) {
            return Err(PinError::AlreadyPinned {
                id: memory_id.to_string(),
            });
        }
        if project_pins.len() >= self.limit_per_project {
            return Err(PinError::LimitExceeded {
                project: project.to_string(),
                limit: self.limit_per_project,
            });
        }

        let mut reason = reason.to_string();
        if reason.len() > PIN_REASON_BYTES_MAX {
            let mut end = PIN_REASON_BYTES_MAX;
            while end > 0 && !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }

        project_pins.insert(
            memory_id.to_string(),
            PinRecord {
                memory_id: memory_id.to_string(),
                reason,
                pinned_at_ms: now_ms,
            },
        );

        Ok(())
    }

    /// Remove a pin.
    ///
    /// # Errors
    /// `NotPinned` when the id has no pin in this project.
    pub fn unpin(&mut self, project: &str, memory_id: &str) -> Result<PinRecord, PinError> {
        self.pins
            .get_mut(project)
            .and_then(|pins| pins.remove(memory_id))
            .ok_or_else(|| PinError::NotPinned {
                id: memory_id.to_string(),
            })
    }

    /// Whether an id is pinned in a project.
    #[must_use]
    pub fn is_pinned(&self, project: &str, memory_id: &str) -> bool {
        self.pins
            .get(project)
            .is_some_and(|pins| pins.contains_key(memory_id))
    }

    /// All pins in a project, oldest first.
    #[must_use]
    pub fn list(&self, project: &str) -> Vec<PinRecord> {
        let mut records: Vec<PinRecord> = self
            .pins
            .get(project)
            .map(|pins| pins.values().cloned().collect())
            .unwrap_or_default();

        records.sort_by(|a, b| {
            a.pinned_at_ms
                .cmp(&b.pinned_at_ms)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        records
    }

    /// Number of pins in a project.
    #[must_use]
    pub fn count(&self, project: &str) -> usize {
        self.pins.get(project).map_or(0, HashMap::len)
    }

    /// Rank unpinned memories likely worth protecting.
    ///
    /// Candidates are restricted to role=RESOLUTION or salience=CRITICAL and
    /// ranked by retention score descending.
    #[must_use]
    pub fn suggest(
        &self,
        project: &str,
        scored: &[(MemoryRecord, RetentionScore)],
        limit: usize,
    ) -> Vec<PinCandidate> {
        assert!(limit > 0, "limit must be > 0");

        let mut candidates: Vec<PinCandidate> = scored
            .iter()
            .filter(|(record, _)| record.project_path == project)
            .filter(|(record, _)| !record.pinned && !self.is_pinned(project, &record.id))
            .filter(|(record, _)| {
                record.role == MemoryRole::Resolution || record.salience == Salience::Critical
            })
            .map(|(record, score)| PinCandidate {
                memory_id: record.id.clone(),
                gist: record.gist.clone(),
                score: score.total,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        candidates.truncate(limit);
        candidates
    }
}

// =============================================================================
// Tests
// =============================================================================
