//! `SimMemoryStore` - In-Memory Storage for Testing
//!
//! `TigerStyle`: Deterministic testing; thread-safe with `RwLock`.
//!
//! # Simulation-First
//!
//! Retention semantics are tested against this store before any durable
//! backend exists. It provides the two properties the engine depends on:
//! `replace` swaps under a single write lock (atomic), and the ledger is an
//! append-only vector whose events only ever transition Pending →
//! Confirmed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::error::{StoreError, StoreResult};
use super::record::MemoryRecord;
use super::store::{MemoryQuery, MemoryStore};
use crate::ledger::{LedgerEvent, LedgerStatus};

#[derive(Debug, Default)]
struct SimState {
    records: HashMap<String, MemoryRecord>,
    ledger: Vec<LedgerEvent>,
    next_seq: u64,
}

/// In-memory storage backend for tests and examples.
///
/// Clones share state, so a store handed to an engine and held by a test
/// observe the same records.
#[derive(Debug, Clone, Default)]
pub struct SimMemoryStore {
    state: Arc<RwLock<SimState>>,
}

impl SimMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SimState {
                records: HashMap::new(),
                ledger: Vec::new(),
                next_seq: 1,
            })),
        }
    }

    /// Total number of records across all projects (for tests).
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.state.read().expect("lock poisoned").records.len()
    }

    /// Number of ledger events (for tests).
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.state.read().expect("lock poisoned").ledger.len()
    }

    fn lock_err() -> StoreError {
        StoreError::internal("state lock poisoned")
    }
}

#[async_trait]
impl MemoryStore for SimMemoryStore {
    async fn put(&self, record: &MemoryRecord) -> StoreResult<String> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        let mut record = record.clone();
        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        state.records.insert(id.clone(), record);

        Ok(id)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MemoryRecord>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.records.get(id).cloned())
    }

    async fn update(&self, record: &MemoryRecord) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        if !state.records.contains_key(&record.id) {
            return Err(StoreError::not_found(&record.id));
        }
        state.records.insert(record.id.clone(), record.clone());

        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        Ok(state.records.remove(id).is_some())
    }

    async fn query(&self, query: &MemoryQuery) -> StoreResult<Vec<MemoryRecord>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;

        let mut matched: Vec<MemoryRecord> = state
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        // Deterministic order regardless of hash-map iteration.
        matched.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    async fn count(&self, project: &str) -> StoreResult<usize> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state
            .records
            .values()
            .filter(|r| r.project_path == project)
            .count())
    }

    async fn replace(
        &self,
        old_ids: &[String],
        replacement: &MemoryRecord,
    ) -> StoreResult<String> {
        assert!(!old_ids.is_empty(), "replace requires at least one old id");

        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        // Verify first: either everything swaps or nothing does.
        for id in old_ids {
            if !state.records.contains_key(id) {
                return Err(StoreError::not_found(id));
            }
        }

        let mut replacement = replacement.clone();
        if replacement.id.is_empty() {
            replacement.id = uuid::Uuid::new_v4().to_string();
        }
        let new_id = replacement.id.clone();

        for id in old_ids {
            state.records.remove(id);
        }
        state.records.insert(new_id.clone(), replacement);

        Ok(new_id)
    }

    async fn append_ledger(&self, event: &LedgerEvent) -> StoreResult<u64> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        let seq = state.next_seq;
        state.next_seq += 1;

        let mut event = event.clone();
        event.seq = seq;
        state.ledger.push(event);

        Ok(seq)
    }

    async fn confirm_ledger(&self, seq: u64) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        let event = state
            .ledger
            .iter_mut()
            .find(|e| e.seq == seq)
            .ok_or(StoreError::LedgerNotFound { seq })?;
        event.status = LedgerStatus::Confirmed;

        Ok(())
    }

    async fn ledger_events(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<LedgerEvent>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;

        let mut events: Vec<LedgerEvent> = state
            .ledger
            .iter()
            .filter(|e| project.map_or(true, |p| e.project == p))
            .cloned()
            .collect();

        events.sort_by(|a, b| b.seq.cmp(&a.seq));
        events.truncate(limit);

        Ok(events)
    }
}

// =============================================================================
// Tests
// =============================================================================
