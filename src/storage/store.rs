//! Memory Store Trait
//!
//! `TigerStyle`: Abstract interface for the storage collaborator.
//!
//! The surrounding system provides the durable store; this core only
//! requires the CRUD contract below plus two properties it cannot supply
//! itself: `replace` is an atomic swap, and reads are snapshot-consistent
//! with respect to concurrent writes.

use async_trait::async_trait;

use super::error::StoreResult;
use super::record::{MemoryRecord, Salience};
use crate::classification::MemoryRole;
use crate::ledger::LedgerEvent;

// =============================================================================
// Query
// =============================================================================

/// Filter for memory queries.
///
/// `TigerStyle`: Builder pattern with defaults; unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Project to query (required)
    pub project: String,
    /// Keep records with salience >= this tier
    pub salience_min: Option<Salience>,
    /// Keep records with salience <= this tier
    pub salience_max: Option<Salience>,
    /// Keep records with this role
    pub role: Option<MemoryRole>,
    /// Keep records created at or before this time
    pub created_before_ms: Option<u64>,
    /// Keep records whose expiry is at or before this time
    pub expires_before_ms: Option<u64>,
    /// Keep records with this pinned state
    pub pinned: Option<bool>,
    /// Maximum records returned
    pub limit: Option<usize>,
}

impl MemoryQuery {
    /// Create a query over a project.
    ///
    /// # Panics
    /// Panics if project is empty.
    #[must_use]
    pub fn project(project: impl Into<String>) -> Self {
        let project = project.into();
        assert!(!project.is_empty(), "project must not be empty");
        Self {
            project,
            ..Self::default()
        }
    }

    /// Keep records with salience at or above `tier`.
    #[must_use]
    pub fn with_salience_min(mut self, tier: Salience) -> Self {
        self.salience_min = Some(tier);
        self
    }

    /// Keep records with salience at or below `tier`.
    #[must_use]
    pub fn with_salience_max(mut self, tier: Salience) -> Self {
        self.salience_max = Some(tier);
        self
    }

    /// Keep records with the given role.
    #[must_use]
    pub fn with_role(mut self, role: MemoryRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Keep records created at or before `ms`.
    #[must_use]
    pub fn with_created_before_ms(mut self, ms: u64) -> Self {
        self.created_before_ms = Some(ms);
        self
    }

    /// Keep records expiring at or before `ms`.
    #[must_use]
    pub fn with_expires_before_ms(mut self, ms: u64) -> Self {
        self.expires_before_ms = Some(ms);
        self
    }

    /// Keep records with the given pinned state.
    #[must_use]
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    /// Limit the number of records returned.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "limit must be > 0");
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes this filter.
    #[must_use]
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if record.project_path != self.project {
            return false;
        }
        if let Some(min) = self.salience_min {
            if record.salience < min {
                return false;
            }
        }
        if let Some(max) = self.salience_max {
            if record.salience > max {
                return false;
            }
        }
        if let Some(role) = self.role {
            if record.role != role {
                return false;
            }
        }
        if let Some(before) = self.created_before_ms {
            if record.created_at_ms > before {
                return false;
            }
        }
        if let Some(before) = self.expires_before_ms {
            if !record.is_expired(before) {
                return false;
            }
        }
        if let Some(pinned) = self.pinned {
            if record.pinned != pinned {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Abstract storage collaborator for memory records and the ledger.
///
/// `TigerStyle`: All operations are async, return explicit errors.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store a record, assigning an id when the record has none.
    ///
    /// Returns the record id. Existing ids are upserted.
    async fn put(&self, record: &MemoryRecord) -> StoreResult<String>;

    /// Get a record by id. Returns None when absent.
    async fn get(&self, id: &str) -> StoreResult<Option<MemoryRecord>>;

    /// Update an existing record in place.
    ///
    /// Fails with `NotFound` when the id is unknown.
    async fn update(&self, record: &MemoryRecord) -> StoreResult<()>;

    /// Delete a record by id. Returns true if it existed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Query records. Results are ordered by creation time then id, so the
    /// same store state always yields the same list.
    async fn query(&self, query: &MemoryQuery) -> StoreResult<Vec<MemoryRecord>>;

    /// Count records in a project.
    async fn count(&self, project: &str) -> StoreResult<usize>;

    /// Atomically replace `old_ids` with a single new record.
    ///
    /// Either every old id is removed and the replacement inserted, or
    /// nothing changes. Returns the replacement id.
    async fn replace(&self, old_ids: &[String], replacement: &MemoryRecord)
        -> StoreResult<String>;

    /// Append a ledger event. Returns the assigned sequence number (>= 1).
    async fn append_ledger(&self, event: &LedgerEvent) -> StoreResult<u64>;

    /// Mark a pending ledger event confirmed.
    async fn confirm_ledger(&self, seq: u64) -> StoreResult<()>;

    /// Read ledger events, newest first; `project = None` reads all.
    async fn ledger_events(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<LedgerEvent>>;
}

// =============================================================================
// Tests
// =============================================================================
