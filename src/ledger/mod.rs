//! Forgetting Ledger - Append-Only Audit Trail
//!
//! `TigerStyle`: Immutable events, explicit two-phase status, dependency
//! injection instead of globals.
//!
//! Every operation that removes, merges, or downgrades a memory writes
//! exactly one ledger event. For operations that replace stored data, the
//! event is appended as `Pending` *before* the storage mutation and marked
//! `Confirmed` only after the mutation succeeds; a crash between the two
//! steps leaves a detectable Pending event and intact originals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::LEDGER_REASON_BYTES_MAX;
use crate::storage::{MemoryStore, StoreResult};

// =============================================================================
// Event Type and Status
// =============================================================================

/// Kind of mutating operation a ledger event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventType {
    /// A group of memories was replaced by one compressed record
    Consolidation,
    /// Expired low-value memories were removed
    Decay,
    /// A repeated fingerprint was folded into an existing record
    Aggregation,
    /// An explicit caller-requested removal
    Manual,
}

impl LedgerEventType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventType::Consolidation => "consolidation",
            LedgerEventType::Decay => "decay",
            LedgerEventType::Aggregation => "aggregation",
            LedgerEventType::Manual => "manual",
        }
    }
}

impl std::fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two-phase commit status of an event.
///
/// `Pending` events were written before the storage mutation; a Pending
/// event without a matching Confirmed transition marks an interrupted
/// operation whose originals are still intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Written ahead of the mutation
    Pending,
    /// Mutation completed
    Confirmed,
}

// =============================================================================
// Ledger Event
// =============================================================================

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Sequence number assigned by the sink on append (0 before append)
    pub seq: u64,
    /// Event time in epoch milliseconds
    pub timestamp_ms: u64,
    /// Kind of operation
    pub event_type: LedgerEventType,
    /// Retention action name that triggered the operation
    pub action: String,
    /// Project the operation applied to
    pub project: String,
    /// Memory count before the operation
    pub memories_before: usize,
    /// Memory count after the operation
    pub memories_after: usize,
    /// Ids removed from storage
    pub removed_ids: Vec<String>,
    /// Ids created by the operation
    pub resulting_ids: Vec<String>,
    /// Entities carried into the replacement (consolidation only)
    pub entities_preserved: usize,
    /// CAUSE memories represented in the replacement
    pub root_causes_preserved: usize,
    /// RESOLUTION memories represented in the replacement
    pub resolutions_preserved: usize,
    /// Human-readable explanation
    pub reason: String,
    /// Policy name that decided the action
    pub policy: String,
    /// Whether the operation can be undone
    pub reversible: bool,
    /// Two-phase commit status
    pub status: LedgerStatus,
}

impl LedgerEvent {
    /// Start building an event.
    #[must_use]
    pub fn builder(
        event_type: LedgerEventType,
        project: impl Into<String>,
        timestamp_ms: u64,
    ) -> LedgerEventBuilder {
        LedgerEventBuilder::new(event_type, project, timestamp_ms)
    }

    /// Net change in memory count recorded by this event.
    #[must_use]
    pub fn count_delta(&self) -> i64 {
        self.memories_before as i64 - self.memories_after as i64
    }

    /// Event time rendered as RFC 3339 for display.
    #[must_use]
    pub fn timestamp_rfc3339(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.timestamp_ms as i64)
            .map_or_else(|| format!("{}ms", self.timestamp_ms), |dt| dt.to_rfc3339())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`LedgerEvent`].
///
/// `TigerStyle`: Fluent `with_*` methods, validation at build.
#[derive(Debug)]
pub struct LedgerEventBuilder {
    event: LedgerEvent,
}

impl LedgerEventBuilder {
    fn new(event_type: LedgerEventType, project: impl Into<String>, timestamp_ms: u64) -> Self {
        let project = project.into();
        assert!(!project.is_empty(), "project must not be empty");

        Self {
            event: LedgerEvent {
                seq: 0,
                timestamp_ms,
                event_type,
                action: String::new(),
                project,
                memories_before: 0,
                memories_after: 0,
                removed_ids: Vec::new(),
                resulting_ids: Vec::new(),
                entities_preserved: 0,
                root_causes_preserved: 0,
                resolutions_preserved: 0,
                reason: String::new(),
                policy: String::new(),
                reversible: false,
                status: LedgerStatus::Confirmed,
            },
        }
    }

    /// Set the retention action name.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.event.action = action.into();
        self
    }

    /// Set before/after memory counts.
    #[must_use]
    pub fn with_counts(mut self, before: usize, after: usize) -> Self {
        self.event.memories_before = before;
        self.event.memories_after = after;
        self
    }

    /// Set removed ids.
    #[must_use]
    pub fn with_removed_ids(mut self, ids: Vec<String>) -> Self {
        self.event.removed_ids = ids;
        self
    }

    /// Set resulting ids.
    #[must_use]
    pub fn with_resulting_ids(mut self, ids: Vec<String>) -> Self {
        self.event.resulting_ids = ids;
        self
    }

    /// Set preservation counters.
    #[must_use]
    pub fn with_preserved(mut self, entities: usize, root_causes: usize, resolutions: usize) -> Self {
        self.event.entities_preserved = entities;
        self.event.root_causes_preserved = root_causes;
        self.event.resolutions_preserved = resolutions;
        self
    }

    /// Set the human-readable reason (truncated to the ledger limit).
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.len() > LEDGER_REASON_BYTES_MAX {
            let mut end = LEDGER_REASON_BYTES_MAX;
            while end > 0 && !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        self.event.reason = reason;
        self
    }

    /// Set the deciding policy name.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.event.policy = policy.into();
        self
    }

    /// Mark the operation reversible.
    #[must_use]
    pub fn reversible(mut self, reversible: bool) -> Self {
        self.event.reversible = reversible;
        self
    }

    /// Mark the event as written ahead of its mutation.
    #[must_use]
    pub fn pending(mut self) -> Self {
        self.event.status = LedgerStatus::Pending;
        self
    }

    /// Finish building.
    ///
    /// # Postconditions
    /// - after-count never exceeds before-count plus resulting ids
    #[must_use]
    pub fn build(self) -> LedgerEvent {
        assert!(
            self.event.memories_after
                <= self.event.memories_before + self.event.resulting_ids.len(),
            "after-count {} inconsistent with before-count {} and {} resulting ids",
            self.event.memories_after,
            self.event.memories_before,
            self.event.resulting_ids.len()
        );
        self.event
    }
}

// =============================================================================
// ForgettingLedger
// =============================================================================

/// Handle through which all audit events are written.
///
/// Owned by the retention engine and injected at construction; components
/// never reach for a process-wide sink.
#[derive(Debug)]
pub struct ForgettingLedger<S: MemoryStore> {
    store: Arc<S>,
}

impl<S: MemoryStore> ForgettingLedger<S> {
    /// Create a ledger handle over a storage collaborator.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a confirmed event. Returns the assigned sequence number.
    ///
    /// # Errors
    /// Returns the store error verbatim; an unrecorded mutation would break
    /// the audit guarantee, so callers must treat this as fatal for the
    /// in-flight operation.
    pub async fn record(&self, event: &LedgerEvent) -> StoreResult<u64> {
        self.store.append_ledger(event).await
    }

    /// Append a pending event ahead of a storage mutation.
    ///
    /// # Errors
    /// Returns the store error verbatim.
    pub async fn record_pending(&self, event: &LedgerEvent) -> StoreResult<u64> {
        assert_eq!(
            event.status,
            LedgerStatus::Pending,
            "record_pending requires a pending event"
        );
        self.store.append_ledger(event).await
    }

    /// Confirm a previously appended pending event.
    ///
    /// # Errors
    /// Returns the store error verbatim.
    pub async fn confirm(&self, seq: u64) -> StoreResult<()> {
        self.store.confirm_ledger(seq).await
    }

    /// Read back events, newest first.
    ///
    /// # Errors
    /// Returns the store error verbatim.
    pub async fn events(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<LedgerEvent>> {
        self.store.ledger_events(project, limit).await
    }
}

// =============================================================================
// Tests
// =============================================================================
