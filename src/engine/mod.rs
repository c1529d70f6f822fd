//! Retention Engine - Pipeline Orchestrator
//!
//! `TigerStyle`: One engine instance per deployment; ledger and policy are
//! owned handles injected at construction, never process-wide globals.
//!
//! # Architecture
//!
//! ```text
//! RetentionEngine<S: MemoryStore>
//! ├── submit()               ingestion: cap → aggregate → classify →
//! │                          extract → score → store
//! ├── run_retention_cycle()  decide → execute → learn, one per project
//! │     ├── CompressLight / CompressAggressive → consolidation
//! │     ├── DecayLowValue                      → expiry sweep
//! │     └── ConsolidateAndDecay               → both in sequence
//! ├── pin / unpin / list_pins / suggest_pins
//! ├── forget()               manual removal with a Manual ledger event
//! └── get_ledger / get_statistics / record_access
//! ```
//!
//! # Concurrency
//!
//! - At most one retention cycle runs per project: `decide→execute→learn`
//!   holds a per-project async mutex; a second caller blocks until the
//!   first finishes, never interleaves.
//! - Ingestion runs concurrently with cycles; the aggregator's
//!   match-and-increment is serialized behind one async mutex, which is
//!   what prevents lost updates on `occurrence_count`.
//! - Reads go straight to the store, which provides snapshot-consistent
//!   queries.

mod config;

pub use config::EngineConfig;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregation::{cap_error_salience, Aggregator, Fingerprinter};
use crate::classification::{MemoryRole, RoleClassifier};
use crate::consolidation::{
    ConsolidationConfig, ConsolidationEngine, ConsolidationOutcome,
};
use crate::constants::TIME_MS_PER_DAY;
use crate::dst::{DeterministicRng, SimClock};
use crate::extraction::EntityExtractor;
use crate::ledger::{ForgettingLedger, LedgerEvent, LedgerEventType};
use crate::pinning::{PinCandidate, PinError, PinRecord, PinRegistry};
use crate::policy::{
    LearnedPolicy, PolicyKind, RetentionAction, RetentionContext, RetentionOutcome,
    RetentionPolicy, RuleBasedPolicy,
};
use crate::scoring::RetentionScorer;
use crate::storage::{MemoryQuery, MemoryRecord, MemoryStore, Salience, StoreError};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Submitted text is empty
    #[error("text is empty")]
    EmptyText,

    /// Referenced memory does not exist
    #[error("memory not found: {id}")]
    NotFound {
        /// Missing id
        id: String,
    },

    /// The memory is pinned and immune to this operation
    #[error("memory is pinned: {id}")]
    Pinned {
        /// Protected id
        id: String,
    },

    /// Pin registry refused the operation; nothing was mutated
    #[error(transparent)]
    Pin(#[from] PinError),

    /// Storage collaborator failure
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Submit Metadata
// =============================================================================

/// Metadata accompanying a submitted memory.
///
/// `TigerStyle`: Builder pattern with defaults.
#[derive(Debug, Clone)]
pub struct SubmitMetadata {
    /// Owning project (required)
    pub project_path: String,
    /// Source event type from the capture layer
    pub event_type: Option<String>,
    /// Source file
    pub file_path: Option<String>,
    /// Source line
    pub line_number: Option<u32>,
    /// Caller-suggested salience (capped for error text)
    pub salience_hint: Option<Salience>,
    /// Free-form tags
    pub tags: Vec<String>,
}

impl SubmitMetadata {
    /// Create metadata for a project.
    ///
    /// # Panics
    /// Panics if project is empty.
    #[must_use]
    pub fn new(project_path: impl Into<String>) -> Self {
        let project_path = project_path.into();
        assert!(!project_path.is_empty(), "project_path must not be empty");

        Self {
            project_path,
            event_type: None,
            file_path: None,
            line_number: None,
            salience_hint: None,
            tags: Vec::new(),
        }
    }

    /// Set the source event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Set the source file path.
    #[must_use]
    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Set the source line number.
    #[must_use]
    pub fn with_line_number(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    /// Suggest a salience tier.
    #[must_use]
    pub fn with_salience(mut self, salience: Salience) -> Self {
        self.salience_hint = Some(salience);
        self
    }

    /// Set tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Result of one retention cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Project the cycle ran for
    pub project: String,
    /// Name of the deciding policy
    pub policy: String,
    /// Chosen action
    pub action: RetentionAction,
    /// Context snapshot the decision observed
    pub context: RetentionContext,
    /// Executed (or projected, when dry) outcome
    pub outcome: RetentionOutcome,
    /// Whether storage and ledger were left untouched
    pub dry_run: bool,
}

/// Aggregate statistics for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStatistics {
    /// Total stored memories
    pub total: usize,
    /// Count per salience tier
    pub by_salience: BTreeMap<Salience, usize>,
    /// Count per narrative role
    pub by_role: BTreeMap<MemoryRole, usize>,
    /// Pinned count
    pub pinned: usize,
    /// Estimated token volume
    pub estimated_tokens: usize,
    /// Compression ratios of past mutating cycles, oldest first
    pub compression_ratio_history: Vec<f64>,
}

// =============================================================================
// Retention Engine
// =============================================================================

/// The orchestrator over ingestion, retention cycles, pins and the ledger.
#[derive(Debug)]
pub struct RetentionEngine<S: MemoryStore> {
    store: Arc<S>,
    ledger: ForgettingLedger<S>,
    clock: SimClock,
    config: EngineConfig,
    classifier: RoleClassifier,
    extractor: EntityExtractor,
    fingerprinter: Fingerprinter,
    scorer: RetentionScorer,
    aggregator: tokio::sync::Mutex<Aggregator>,
    policy: tokio::sync::Mutex<Box<dyn RetentionPolicy>>,
    pins: std::sync::RwLock<PinRegistry>,
    cycle_locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    ratio_history: std::sync::Mutex<HashMap<String, Vec<f64>>>,
    ingested_since_action: std::sync::Mutex<HashMap<String, usize>>,
}

impl<S: MemoryStore> RetentionEngine<S> {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(store: S, policy_kind: PolicyKind, clock: SimClock) -> Self {
        Self::with_config(store, policy_kind, clock, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    ///
    /// The requested policy is constructed here; an unbuildable policy is a
    /// construction-time failure, never a silent per-call fallback.
    #[must_use]
    pub fn with_config(
        store: S,
        policy_kind: PolicyKind,
        clock: SimClock,
        config: EngineConfig,
    ) -> Self {
        let policy: Box<dyn RetentionPolicy> = match policy_kind {
            PolicyKind::RuleBased => {
                Box::new(RuleBasedPolicy::with_thresholds(config.rule_thresholds))
            }
            PolicyKind::Learned(profile) => Box::new(LearnedPolicy::new(
                profile,
                DeterministicRng::new(config.policy_seed),
            )),
        };

        Self::with_policy(store, policy, clock, config)
    }

    /// Create an engine with a pre-built policy (e.g. a learned policy
    /// restored from a snapshot).
    #[must_use]
    pub fn with_policy(
        store: S,
        policy: Box<dyn RetentionPolicy>,
        clock: SimClock,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(store);

        info!(policy = policy.name(), "retention engine constructed");

        Self {
            ledger: ForgettingLedger::new(Arc::clone(&store)),
            store,
            classifier: RoleClassifier::new(),
            extractor: EntityExtractor::new(),
            fingerprinter: Fingerprinter::new(),
            scorer: RetentionScorer::new(clock.clone()),
            aggregator: tokio::sync::Mutex::new(Aggregator::with_config(
                clock.clone(),
                config.aggregation.clone(),
            )),
            policy: tokio::sync::Mutex::new(policy),
            pins: std::sync::RwLock::new(PinRegistry::with_limit(config.pin_limit)),
            cycle_locks: std::sync::Mutex::new(HashMap::new()),
            ratio_history: std::sync::Mutex::new(HashMap::new()),
            ingested_since_action: std::sync::Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    /// The engine's clock.
    #[must_use]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Submit a new memory through the full ingestion pipeline.
    ///
    /// Pipeline: error-cap the salience hint, fold into an existing record
    /// on a fingerprint match, otherwise classify, extract, score and store
    /// a fresh record.
    ///
    /// # Errors
    /// `EmptyText` for blank input; store errors verbatim.
    pub async fn submit(
        &self,
        verbatim: &str,
        metadata: SubmitMetadata,
    ) -> Result<MemoryRecord, EngineError> {
        if verbatim.trim().is_empty() {
            return Err(EngineError::EmptyText);
        }

        let now_ms = self.clock.now_ms();
        let requested = metadata.salience_hint.unwrap_or(Salience::Medium);
        let capped = cap_error_salience(verbatim, requested);

        let fingerprint = self.fingerprinter.fingerprint(
            verbatim,
            metadata.file_path.as_deref(),
            metadata.line_number,
        );

        // Single-writer for match-and-increment: the lock spans the lookup
        // and the store update, so concurrent submits of the same
        // fingerprint cannot lose an occurrence.
        let mut aggregator = self.aggregator.lock().await;

        if let Some(hit) = aggregator.record_occurrence(&fingerprint) {
            match self.store.get(&hit.memory_id).await? {
                // Pinned records are immune to every mutating operation,
                // the occurrence fold included.
                Some(record) if record.pinned => {
                    return Ok(record);
                }
                Some(mut record) => {
                    record.occurrence_count = hit.occurrences;
                    let downgraded_to = hit.salience.min(record.salience);
                    let downgraded = downgraded_to < record.salience;
                    record.salience = downgraded_to;
                    record.last_accessed_ms = now_ms;
                    // A record pushed down into the decayable tiers starts
                    // its retention window now.
                    if record.expires_at_ms.is_none() {
                        match record.salience {
                            Salience::Noise => {
                                record.expires_at_ms = Some(now_ms + self.config.noise_ttl_ms);
                            }
                            Salience::Low => {
                                record.expires_at_ms = Some(now_ms + self.config.low_ttl_ms);
                            }
                            _ => {}
                        }
                    }
                    record.retention_score = self.scorer.score(&record).total;

                    if downgraded {
                        // Ledger before the mutation becomes visible.
                        let count = self.store.count(&record.project_path).await?;
                        let event = LedgerEvent::builder(
                            LedgerEventType::Aggregation,
                            &record.project_path,
                            now_ms,
                        )
                        .with_action("aggregate")
                        .with_counts(count, count)
                        .with_reason(format!(
                            "occurrence {} downgraded {} to {}",
                            hit.occurrences,
                            record.id,
                            record.salience
                        ))
                        .with_policy("aggregation")
                        .reversible(true)
                        .build();
                        self.ledger.record(&event).await?;
                    }

                    self.store.update(&record).await?;
                    debug!(
                        id = %record.id,
                        occurrences = hit.occurrences,
                        salience = %record.salience,
                        "aggregated repeated memory"
                    );
                    return Ok(record);
                }
                None => {
                    // The tracked record was consolidated or removed; start
                    // a fresh aggregation cycle below.
                    aggregator.forget_memory(&hit.memory_id);
                }
            }
        }

        let classification = self.classifier.classify(verbatim);
        let entities = self.extractor.extract(verbatim);

        let mut builder = MemoryRecord::builder(&metadata.project_path, verbatim, now_ms)
            .with_salience(capped)
            .with_role(classification.role)
            .with_entities(entities)
            .with_tags(metadata.tags.clone());

        if let Some(file_path) = &metadata.file_path {
            builder = builder.with_file_path(file_path.clone());
        }
        if let Some(line_number) = metadata.line_number {
            builder = builder.with_line_number(line_number);
        }
        match capped {
            Salience::Noise => {
                builder = builder.with_expires_at_ms(now_ms + self.config.noise_ttl_ms);
            }
            Salience::Low => {
                builder = builder.with_expires_at_ms(now_ms + self.config.low_ttl_ms);
            }
            _ => {}
        }

        let mut record = builder.build();
        record.retention_score = self.scorer.score(&record).total;

        let id = self.store.put(&record).await?;
        record.id = id;

        aggregator.register(&fingerprint, &record.id, record.salience);
        drop(aggregator);

        if let Ok(mut counters) = self.ingested_since_action.lock() {
            *counters.entry(metadata.project_path.clone()).or_insert(0) += 1;
        }

        debug!(
            id = %record.id,
            role = %record.role,
            salience = %record.salience,
            "stored new memory"
        );
        Ok(record)
    }

    /// Record a recall-side access, feeding the usage and recency signals.
    ///
    /// # Errors
    /// `NotFound` for unknown ids; store errors verbatim.
    pub async fn record_access(&self, id: &str) -> Result<MemoryRecord, EngineError> {
        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;

        record.touch(self.clock.now_ms());
        record.retention_score = self.scorer.score(&record).total;
        self.store.update(&record).await?;

        Ok(record)
    }

    // =========================================================================
    // Pinning
    // =========================================================================

    /// Pin a memory, making it immune to every mutating retention
    /// operation until explicitly unpinned.
    ///
    /// # Errors
    /// `NotFound` for unknown ids; `PinError::LimitExceeded` when the
    /// per-project cap is reached (no mutation performed).
    pub async fn pin(&self, id: &str, reason: &str) -> Result<(), EngineError> {
        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;

        let now_ms = self.clock.now_ms();
        {
            let mut pins = self.pins.write().expect("pin registry lock poisoned");
            pins.pin(&record.project_path, id, reason, now_ms)?;
        }

        record.pinned = true;
        record.retention_score = self.scorer.score(&record).total;

        if let Err(error) = self.store.update(&record).await {
            // Roll the registry back so state stays consistent.
            let mut pins = self.pins.write().expect("pin registry lock poisoned");
            let _ = pins.unpin(&record.project_path, id);
            return Err(error.into());
        }

        info!(id, reason, "memory pinned");
        Ok(())
    }

    /// Remove a pin.
    ///
    /// # Errors
    /// `NotFound` for unknown ids; `PinError::NotPinned` when no pin
    /// exists.
    pub async fn unpin(&self, id: &str) -> Result<(), EngineError> {
        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;

        {
            let mut pins = self.pins.write().expect("pin registry lock poisoned");
            pins.unpin(&record.project_path, id)?;
        }

        record.pinned = false;
        record.retention_score = self.scorer.score(&record).total;
        self.store.update(&record).await?;

        info!(id, "memory unpinned");
        Ok(())
    }

    /// All pins in a project, oldest first.
    #[must_use]
    pub fn list_pins(&self, project: &str) -> Vec<PinRecord> {
        self.pins
            .read()
            .expect("pin registry lock poisoned")
            .list(project)
    }

    /// Rank unpinned memories likely worth protecting.
    ///
    /// # Errors
    /// Store errors verbatim.
    pub async fn suggest_pins(
        &self,
        project: &str,
        limit: usize,
    ) -> Result<Vec<PinCandidate>, EngineError> {
        let records = self.store.query(&MemoryQuery::project(project)).await?;
        let scored: Vec<_> = records
            .into_iter()
            .map(|record| {
                let score = self.scorer.score(&record);
                (record, score)
            })
            .collect();

        Ok(self
            .pins
            .read()
            .expect("pin registry lock poisoned")
            .suggest(project, &scored, limit))
    }

    // =========================================================================
    // Manual Forgetting
    // =========================================================================

    /// Explicitly remove one memory, with a Manual ledger event written
    /// ahead of the deletion.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Pinned` for protected records (no
    /// mutation), store errors verbatim.
    pub async fn forget(&self, id: &str, reason: &str) -> Result<(), EngineError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;

        if record.pinned {
            return Err(EngineError::Pinned { id: id.to_string() });
        }

        let now_ms = self.clock.now_ms();
        let count_before = self.store.count(&record.project_path).await?;

        let event = LedgerEvent::builder(LedgerEventType::Manual, &record.project_path, now_ms)
            .with_action("forget")
            .with_counts(count_before, count_before.saturating_sub(1))
            .with_removed_ids(vec![id.to_string()])
            .with_reason(reason)
            .with_policy("manual")
            .pending()
            .build();
        let seq = self.ledger.record_pending(&event).await?;

        self.store.delete(id).await?;
        self.ledger.confirm(seq).await?;

        self.aggregator.lock().await.forget_memory(id);

        info!(id, reason, "memory forgotten manually");
        Ok(())
    }

    // =========================================================================
    // Retention Cycle
    // =========================================================================

    /// Run one retention cycle for a project.
    ///
    /// `decide → execute → learn` runs as one unit; concurrent callers for
    /// the same project block until the in-flight cycle completes. With
    /// `dry_run` the decision and a projected outcome are computed from
    /// read-only queries and neither storage nor the ledger is touched.
    ///
    /// # Errors
    /// Store and ledger errors verbatim.
    pub async fn run_retention_cycle(
        &self,
        project: &str,
        dry_run: bool,
    ) -> Result<CycleReport, EngineError> {
        assert!(!project.is_empty(), "project must not be empty");

        let cycle_lock = self.cycle_lock_for(project);
        let _guard = cycle_lock.lock().await;

        let context = self.build_context(project).await?;

        let mut policy = self.policy.lock().await;
        let action = policy.decide(&context);
        let policy_name = policy.name().to_string();

        info!(project, action = %action, policy = %policy_name, dry_run, "retention decision");

        if dry_run {
            drop(policy);
            let outcome = self.project_outcome(project, action, &context).await?;
            return Ok(CycleReport {
                project: project.to_string(),
                policy: policy_name,
                action,
                context,
                outcome,
                dry_run: true,
            });
        }

        let outcome = self.execute(project, action, &policy_name, &context).await?;
        policy.learn(&context, action, &outcome);
        drop(policy);

        if action.is_mutating() {
            if let Ok(mut history) = self.ratio_history.lock() {
                history
                    .entry(project.to_string())
                    .or_default()
                    .push(outcome.compression_ratio());
            }
        }
        if let Ok(mut counters) = self.ingested_since_action.lock() {
            counters.insert(project.to_string(), 0);
        }

        Ok(CycleReport {
            project: project.to_string(),
            policy: policy_name,
            action,
            context,
            outcome,
            dry_run: false,
        })
    }

    /// Read back audit events, newest first.
    ///
    /// # Errors
    /// Store errors verbatim.
    pub async fn get_ledger(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LedgerEvent>, EngineError> {
        Ok(self.ledger.events(project, limit).await?)
    }

    /// Aggregate statistics for a project.
    ///
    /// # Errors
    /// Store errors verbatim.
    pub async fn get_statistics(&self, project: &str) -> Result<ProjectStatistics, EngineError> {
        let records = self.store.query(&MemoryQuery::project(project)).await?;

        let mut by_salience: BTreeMap<Salience, usize> = BTreeMap::new();
        let mut by_role: BTreeMap<MemoryRole, usize> = BTreeMap::new();
        let mut pinned = 0;
        let mut estimated_tokens = 0;

        for record in &records {
            *by_salience.entry(record.salience).or_insert(0) += 1;
            *by_role.entry(record.role).or_insert(0) += 1;
            if record.pinned {
                pinned += 1;
            }
            estimated_tokens += record.estimated_tokens();
        }

        let compression_ratio_history = self
            .ratio_history
            .lock()
            .map(|history| history.get(project).cloned().unwrap_or_default())
            .unwrap_or_default();

        Ok(ProjectStatistics {
            total: records.len(),
            by_salience,
            by_role,
            pinned,
            estimated_tokens,
            compression_ratio_history,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn cycle_lock_for(&self, project: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.cycle_locks.lock().expect("cycle lock map poisoned");
        Arc::clone(
            locks
                .entry(project.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Build a fresh context snapshot for a project.
    async fn build_context(&self, project: &str) -> Result<RetentionContext, EngineError> {
        let now_ms = self.clock.now_ms();
        let records = self.store.query(&MemoryQuery::project(project)).await?;

        let mut context = RetentionContext {
            project_path: project.to_string(),
            total_memories: records.len(),
            ..RetentionContext::default()
        };

        let mut age_sum_days = 0.0;
        for record in &records {
            match record.salience {
                Salience::Critical => context.critical_count += 1,
                Salience::High => context.high_count += 1,
                Salience::Medium => context.medium_count += 1,
                Salience::Low => context.low_count += 1,
                Salience::Noise => context.noise_count += 1,
            }

            let age_days = record.age_ms(now_ms) as f64 / TIME_MS_PER_DAY as f64;
            age_sum_days += age_days;
            context.oldest_age_days = context.oldest_age_days.max(age_days);
            context.estimated_tokens += record.estimated_tokens();

            let day_ago = now_ms.saturating_sub(TIME_MS_PER_DAY);
            if record.created_at_ms >= day_ago {
                context.memories_added_last_day += 1;
            }
            if record.access_count > 0 && record.last_accessed_ms >= day_ago {
                context.memories_accessed_last_day += 1;
            }
        }

        if !records.is_empty() {
            context.avg_age_days = age_sum_days / records.len() as f64;
        }

        context.memories_since_last_action = self
            .ingested_since_action
            .lock()
            .map(|counters| counters.get(project).copied().unwrap_or(0))
            .unwrap_or(0);

        Ok(context)
    }

    /// Execute one action and produce its outcome.
    async fn execute(
        &self,
        project: &str,
        action: RetentionAction,
        policy_name: &str,
        context: &RetentionContext,
    ) -> Result<RetentionOutcome, EngineError> {
        let started_ms = self.clock.now_ms();
        let before = context.total_memories;

        let mut tokens_saved = 0;
        let mut entities_preserved = 0;
        let mut errors = 0;

        match action {
            RetentionAction::DoNothing => {}
            RetentionAction::CompressLight => {
                let consolidation = self.config.consolidation_light.clone();
                let (saved, preserved, errs) = self
                    .consolidate_project(project, consolidation, action, policy_name)
                    .await?;
                tokens_saved += saved;
                entities_preserved += preserved;
                errors += errs;
            }
            RetentionAction::CompressAggressive => {
                let consolidation = self.config.consolidation_aggressive.clone();
                let (saved, preserved, errs) = self
                    .consolidate_project(project, consolidation, action, policy_name)
                    .await?;
                tokens_saved += saved;
                entities_preserved += preserved;
                errors += errs;
            }
            RetentionAction::DecayLowValue => {
                let (saved, errs) = self.decay_project(project, action, policy_name).await?;
                tokens_saved += saved;
                errors += errs;
            }
            RetentionAction::ConsolidateAndDecay => {
                let consolidation = self.config.consolidation_light.clone();
                let (saved, preserved, errs) = self
                    .consolidate_project(project, consolidation, action, policy_name)
                    .await?;
                tokens_saved += saved;
                entities_preserved += preserved;
                errors += errs;

                let (saved, errs) = self.decay_project(project, action, policy_name).await?;
                tokens_saved += saved;
                errors += errs;
            }
        }

        let after = self.store.count(project).await?;

        Ok(RetentionOutcome {
            action,
            memories_before: before,
            memories_after: after,
            tokens_saved,
            entities_preserved,
            errors,
            elapsed_ms: self.clock.now_ms().saturating_sub(started_ms),
            dry_run: false,
        })
    }

    /// Consolidate every eligible group in a project.
    ///
    /// Per group: a Pending ledger event precedes the atomic replace, and
    /// the event is Confirmed only after the replace succeeds. A replace
    /// failure leaves originals intact plus a detectable Pending event.
    async fn consolidate_project(
        &self,
        project: &str,
        consolidation: ConsolidationConfig,
        action: RetentionAction,
        policy_name: &str,
    ) -> Result<(usize, usize, usize), EngineError> {
        let engine = ConsolidationEngine::new(self.clock.clone(), consolidation);
        let records = self.store.query(&MemoryQuery::project(project)).await?;
        let groups = engine.plan(&records);

        let mut tokens_saved = 0;
        let mut entities_preserved = 0;
        let mut errors = 0;

        for group in groups {
            let ConsolidationOutcome::Consolidated(compressed) = engine.consolidate_group(&group)
            else {
                continue;
            };

            let now_ms = self.clock.now_ms();
            let mut replacement = compressed.into_record(project, now_ms);
            // Pre-assign the id so the pending event can name what the
            // replace will create.
            replacement.id = uuid::Uuid::new_v4().to_string();
            let count_before = self.store.count(project).await?;
            let count_after = count_before.saturating_sub(group.len()) + 1;

            let event = LedgerEvent::builder(LedgerEventType::Consolidation, project, now_ms)
                .with_action(action.as_str())
                .with_counts(count_before, count_after)
                .with_removed_ids(compressed.source_ids.clone())
                .with_resulting_ids(vec![replacement.id.clone()])
                .with_preserved(
                    compressed.entities.count(),
                    compressed.root_causes_preserved(),
                    compressed.resolutions_preserved(),
                )
                .with_reason(format!(
                    "consolidated {} memories for {}",
                    compressed.source_count(),
                    compressed.file_path.as_deref().unwrap_or("-"),
                ))
                .with_policy(policy_name)
                .reversible(false)
                .pending()
                .build();

            // An unrecorded mutation would break the audit guarantee, so a
            // ledger failure aborts this group before anything changes.
            let seq = self.ledger.record_pending(&event).await?;

            match self
                .store
                .replace(&compressed.source_ids, &replacement)
                .await
            {
                Ok(new_id) => {
                    if let Err(error) = self.ledger.confirm(seq).await {
                        warn!(seq, %error, "consolidation confirmed late; event left pending");
                        errors += 1;
                    }

                    let group_tokens: usize = group.iter().map(MemoryRecord::estimated_tokens).sum();
                    tokens_saved += group_tokens.saturating_sub(replacement.estimated_tokens());
                    entities_preserved += compressed.entities.count();

                    let mut aggregator = self.aggregator.lock().await;
                    for id in &compressed.source_ids {
                        aggregator.forget_memory(id);
                    }
                    drop(aggregator);

                    debug!(
                        project,
                        new_id = %new_id,
                        replaced = compressed.source_count(),
                        "consolidated group"
                    );
                }
                Err(error) => {
                    // Originals intact; the Pending event marks the abort.
                    warn!(project, %error, "consolidation replace failed; originals intact");
                    errors += 1;
                }
            }
        }

        Ok((tokens_saved, entities_preserved, errors))
    }

    /// Remove expired LOW/NOISE memories past their retention window.
    async fn decay_project(
        &self,
        project: &str,
        action: RetentionAction,
        policy_name: &str,
    ) -> Result<(usize, usize), EngineError> {
        let now_ms = self.clock.now_ms();

        let expired = self
            .store
            .query(
                &MemoryQuery::project(project)
                    .with_salience_max(Salience::Low)
                    .with_expires_before_ms(now_ms)
                    .with_pinned(false),
            )
            .await?;

        if expired.is_empty() {
            return Ok((0, 0));
        }

        let count_before = self.store.count(project).await?;
        let removed_ids: Vec<String> = expired.iter().map(|r| r.id.clone()).collect();

        let event = LedgerEvent::builder(LedgerEventType::Decay, project, now_ms)
            .with_action(action.as_str())
            .with_counts(count_before, count_before.saturating_sub(removed_ids.len()))
            .with_removed_ids(removed_ids.clone())
            .with_reason(format!(
                "decayed {} expired low-value memories",
                removed_ids.len()
            ))
            .with_policy(policy_name)
            .reversible(false)
            .pending()
            .build();
        let seq = self.ledger.record_pending(&event).await?;

        let mut errors = 0;
        let mut tokens_saved = 0;
        for record in &expired {
            match self.store.delete(&record.id).await {
                Ok(_) => tokens_saved += record.estimated_tokens(),
                Err(error) => {
                    warn!(id = %record.id, %error, "decay delete failed");
                    errors += 1;
                }
            }
        }

        self.ledger.confirm(seq).await?;

        let mut aggregator = self.aggregator.lock().await;
        for id in &removed_ids {
            aggregator.forget_memory(id);
        }
        drop(aggregator);

        debug!(project, removed = removed_ids.len(), "decay sweep complete");
        Ok((tokens_saved, errors))
    }

    /// Projected outcome for a dry run: read-only planning, no mutation.
    async fn project_outcome(
        &self,
        project: &str,
        action: RetentionAction,
        context: &RetentionContext,
    ) -> Result<RetentionOutcome, EngineError> {
        let now_ms = self.clock.now_ms();
        let before = context.total_memories;

        let mut removed = 0;
        let mut tokens_saved = 0;
        let mut entities_preserved = 0;
        let mut consumed_ids = std::collections::BTreeSet::new();

        let consolidation = match action {
            RetentionAction::CompressLight | RetentionAction::ConsolidateAndDecay => {
                Some(self.config.consolidation_light.clone())
            }
            RetentionAction::CompressAggressive => {
                Some(self.config.consolidation_aggressive.clone())
            }
            RetentionAction::DoNothing | RetentionAction::DecayLowValue => None,
        };

        if let Some(consolidation) = consolidation {
            let engine = ConsolidationEngine::new(self.clock.clone(), consolidation);
            let records = self.store.query(&MemoryQuery::project(project)).await?;
            for group in engine.plan(&records) {
                if let ConsolidationOutcome::Consolidated(compressed) =
                    engine.consolidate_group(&group)
                {
                    let replacement = compressed.into_record(project, now_ms);
                    let group_tokens: usize =
                        group.iter().map(MemoryRecord::estimated_tokens).sum();
                    removed += group.len() - 1;
                    tokens_saved += group_tokens.saturating_sub(replacement.estimated_tokens());
                    entities_preserved += compressed.entities.count();
                    consumed_ids.extend(compressed.source_ids.iter().cloned());
                }
            }
        }

        if matches!(
            action,
            RetentionAction::DecayLowValue | RetentionAction::ConsolidateAndDecay
        ) {
            let expired = self
                .store
                .query(
                    &MemoryQuery::project(project)
                        .with_salience_max(Salience::Low)
                        .with_expires_before_ms(now_ms)
                        .with_pinned(false),
                )
                .await?;
            // Records already absorbed by a projected consolidation cannot
            // decay a second time.
            let decayable: Vec<&MemoryRecord> = expired
                .iter()
                .filter(|r| !consumed_ids.contains(&r.id))
                .collect();
            removed += decayable.len();
            tokens_saved += decayable
                .iter()
                .map(|r| r.estimated_tokens())
                .sum::<usize>();
        }

        Ok(RetentionOutcome {
            action,
            memories_before: before,
            memories_after: before.saturating_sub(removed),
            tokens_saved,
            entities_preserved,
            errors: 0,
            elapsed_ms: 0,
            dry_run: true,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIME_MS_PER_DAY;
    use crate::policy::RewardProfile;
    use crate::storage::SimMemoryStore;

    fn engine_at(now_ms: u64) -> RetentionEngine<SimMemoryStore> {
        RetentionEngine::new(
            SimMemoryStore::new(),
            PolicyKind::RuleBased,
            SimClock::at_ms(now_ms),
        )
    }

    /// Distinct wording per index: the fingerprint normalizer strips digits,
    /// so numbered texts would all collide into one aggregated record.
    fn unique_text(prefix: &str, i: usize) -> String {
        let a = (b'a' + (i / 26) as u8) as char;
        let b = (b'a' + (i % 26) as u8) as char;
        format!("{prefix} {a}{b} entry")
    }

    #[tokio::test]
    async fn test_submit_pipeline_classifies_and_extracts() {
        let engine = engine_at(1_000);

        let record = engine
            .submit(
                "Fixed TypeError in auth.py: JWT timestamp mismatch",
                SubmitMetadata::new("/proj").with_file_path("auth.py"),
            )
            .await
            .unwrap();

        assert_eq!(record.role, MemoryRole::Resolution);
        assert!(record.entities.error_types.contains("TypeError"));
        assert!(record
            .entities
            .file_paths
            .iter()
            .any(|p| p.contains("auth.py")));
        assert!(record.retention_score > 0.0);
        assert!(!record.id.is_empty());
    }

    #[tokio::test]
    async fn test_submit_empty_text_fails() {
        let engine = engine_at(0);
        let err = engine
            .submit("   ", SubmitMetadata::new("/proj"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyText));
    }

    #[tokio::test]
    async fn test_submit_caps_error_salience() {
        let engine = engine_at(0);

        let record = engine
            .submit(
                "Error in pythonBridge.ts: Cannot find name 'optional'",
                SubmitMetadata::new("/proj").with_salience(Salience::Critical),
            )
            .await
            .unwrap();

        assert_eq!(record.salience, Salience::Medium);
    }

    #[tokio::test]
    async fn test_repeated_submit_aggregates() {
        let engine = engine_at(0);
        let meta = SubmitMetadata::new("/proj")
            .with_file_path("test.py")
            .with_line_number(42);

        let first = engine
            .submit("SyntaxError: Unexpected token", meta.clone())
            .await
            .unwrap();

        let mut last = first.clone();
        for _ in 0..24 {
            last = engine
                .submit("SyntaxError: Unexpected token", meta.clone())
                .await
                .unwrap();
        }

        assert_eq!(last.id, first.id);
        assert_eq!(last.occurrence_count, 25);
        assert_eq!(last.salience, Salience::Noise);
        // One record in storage, not 25.
        let stats = engine.get_statistics("/proj").await.unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn test_aggregation_writes_downgrade_events() {
        let engine = engine_at(0);
        let meta = SubmitMetadata::new("/proj").with_file_path("a.py");

        for _ in 0..6 {
            engine.submit("Error: boom", meta.clone()).await.unwrap();
        }

        let events = engine.get_ledger(Some("/proj"), 50).await.unwrap();
        let aggregation_events: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == LedgerEventType::Aggregation)
            .collect();

        // Downgrade boundary crossed at occurrence 2 (Medium -> Low); later
        // occurrences inside the bucket do not log.
        assert_eq!(aggregation_events.len(), 1);
        assert_eq!(aggregation_events[0].count_delta(), 0);
    }

    #[tokio::test]
    async fn test_aggregation_never_touches_pinned() {
        let engine = engine_at(0);
        let meta = SubmitMetadata::new("/proj").with_file_path("a.py");

        let first = engine.submit("Error: boom", meta.clone()).await.unwrap();
        engine.pin(&first.id, "keep").await.unwrap();

        let repeat = engine.submit("Error: boom", meta.clone()).await.unwrap();

        assert_eq!(repeat.id, first.id);
        assert!(repeat.pinned);
        assert_eq!(repeat.salience, first.salience);
        assert_eq!(repeat.occurrence_count, 1);
    }

    #[tokio::test]
    async fn test_pin_unpin_lifecycle() {
        let engine = engine_at(0);
        let record = engine
            .submit("Fixed the deploy pipeline", SubmitMetadata::new("/proj"))
            .await
            .unwrap();

        engine.pin(&record.id, "critical fix").await.unwrap();

        let pinned = engine.record_access(&record.id).await.unwrap();
        assert!(pinned.pinned);
        assert!(pinned.retention_score >= 100.0);
        assert_eq!(engine.list_pins("/proj").len(), 1);

        engine.unpin(&record.id).await.unwrap();
        assert!(engine.list_pins("/proj").is_empty());
    }

    #[tokio::test]
    async fn test_pin_limit_surfaces() {
        let engine = RetentionEngine::with_config(
            SimMemoryStore::new(),
            PolicyKind::RuleBased,
            SimClock::new(),
            EngineConfig::default().with_pin_limit(1),
        );

        let first = engine
            .submit("memory one", SubmitMetadata::new("/proj"))
            .await
            .unwrap();
        let second = engine
            .submit("memory two", SubmitMetadata::new("/proj"))
            .await
            .unwrap();

        engine.pin(&first.id, "keep").await.unwrap();
        let err = engine.pin(&second.id, "keep too").await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Pin(PinError::LimitExceeded { limit: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_forget_writes_manual_event() {
        let engine = engine_at(0);
        let record = engine
            .submit("temporary note", SubmitMetadata::new("/proj"))
            .await
            .unwrap();

        engine.forget(&record.id, "user request").await.unwrap();

        let stats = engine.get_statistics("/proj").await.unwrap();
        assert_eq!(stats.total, 0);

        let events = engine.get_ledger(Some("/proj"), 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, LedgerEventType::Manual);
        assert_eq!(events[0].count_delta(), 1);
        assert_eq!(events[0].removed_ids, vec![record.id]);
    }

    #[tokio::test]
    async fn test_forget_pinned_fails() {
        let engine = engine_at(0);
        let record = engine
            .submit("protected note", SubmitMetadata::new("/proj"))
            .await
            .unwrap();
        engine.pin(&record.id, "keep").await.unwrap();

        let err = engine.forget(&record.id, "try").await.unwrap_err();
        assert!(matches!(err, EngineError::Pinned { .. }));

        let stats = engine.get_statistics("/proj").await.unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn test_quiet_cycle_does_nothing() {
        let engine = engine_at(0);
        engine
            .submit("routine context note", SubmitMetadata::new("/proj"))
            .await
            .unwrap();

        let report = engine.run_retention_cycle("/proj", false).await.unwrap();

        assert_eq!(report.action, RetentionAction::DoNothing);
        assert_eq!(report.outcome.memories_before, report.outcome.memories_after);
        assert!(engine.get_ledger(Some("/proj"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_mutates_nothing() {
        let clock = SimClock::new();
        let engine = RetentionEngine::new(SimMemoryStore::new(), PolicyKind::RuleBased, clock.clone());

        // 130 LOW/NOISE memories, old enough to consolidate.
        for i in 0..130 {
            engine
                .submit(
                    &unique_text("worker log", i),
                    SubmitMetadata::new("/proj")
                        .with_salience(Salience::Low)
                        .with_file_path("worker.py"),
                )
                .await
                .unwrap();
        }
        clock.advance_days(40);

        let report = engine.run_retention_cycle("/proj", true).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.action, RetentionAction::ConsolidateAndDecay);
        assert!(report.outcome.memories_after < report.outcome.memories_before);

        // Nothing actually changed.
        let stats = engine.get_statistics("/proj").await.unwrap();
        assert_eq!(stats.total, 130);
        assert!(engine.get_ledger(Some("/proj"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decay_removes_expired_low_value() {
        let clock = SimClock::new();
        let engine = RetentionEngine::new(SimMemoryStore::new(), PolicyKind::RuleBased, clock.clone());

        for i in 0..5 {
            engine
                .submit(
                    &unique_text("stray chatter", i),
                    SubmitMetadata::new("/proj").with_salience(Salience::Noise),
                )
                .await
                .unwrap();
        }
        // A keeper that never expires.
        engine
            .submit(
                "Fixed the scheduler race condition",
                SubmitMetadata::new("/proj").with_salience(Salience::High),
            )
            .await
            .unwrap();

        // Past the NOISE ttl and the 90-day decay-age rule threshold.
        clock.advance_days(91);

        let report = engine.run_retention_cycle("/proj", false).await.unwrap();

        assert_eq!(report.action, RetentionAction::DecayLowValue);
        assert_eq!(report.outcome.memories_before, 6);
        assert_eq!(report.outcome.memories_after, 1);

        let events = engine.get_ledger(Some("/proj"), 10).await.unwrap();
        let decay_event = events
            .iter()
            .find(|e| e.event_type == LedgerEventType::Decay)
            .unwrap();
        assert_eq!(decay_event.count_delta(), 5);
        assert_eq!(decay_event.removed_ids.len(), 5);
    }

    #[tokio::test]
    async fn test_learned_policy_cycles_update_table() {
        let clock = SimClock::new();
        let engine = RetentionEngine::with_config(
            SimMemoryStore::new(),
            PolicyKind::Learned(RewardProfile::Balanced),
            clock.clone(),
            EngineConfig::default().with_policy_seed(42),
        );

        for i in 0..30 {
            engine
                .submit(
                    &unique_text("debug log", i),
                    SubmitMetadata::new("/proj").with_salience(Salience::Low),
                )
                .await
                .unwrap();
        }
        clock.advance_days(40);

        for _ in 0..3 {
            let report = engine.run_retention_cycle("/proj", false).await.unwrap();
            assert_eq!(report.policy, "learned");
        }
    }

    #[tokio::test]
    async fn test_concurrent_cycles_serialize() {
        let clock = SimClock::new();
        let engine = Arc::new(RetentionEngine::new(
            SimMemoryStore::new(),
            PolicyKind::RuleBased,
            clock.clone(),
        ));

        for i in 0..10 {
            engine
                .submit(
                    &unique_text("scratch note", i),
                    SubmitMetadata::new("/proj").with_salience(Salience::Low),
                )
                .await
                .unwrap();
        }

        let a = Arc::clone(&engine);
        let b = Arc::clone(&engine);
        let (ra, rb) = tokio::join!(
            a.run_retention_cycle("/proj", false),
            b.run_retention_cycle("/proj", false),
        );

        // Both complete; the per-project mutex serialized them.
        assert!(ra.is_ok());
        assert!(rb.is_ok());
    }

    #[tokio::test]
    async fn test_statistics_aggregate() {
        let engine = engine_at(0);

        engine
            .submit(
                "Fixed the flaky test in ci.py",
                SubmitMetadata::new("/proj").with_salience(Salience::High),
            )
            .await
            .unwrap();
        engine
            .submit(
                "background note about the build",
                SubmitMetadata::new("/proj").with_salience(Salience::Low),
            )
            .await
            .unwrap();

        let stats = engine.get_statistics("/proj").await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_salience[&Salience::High], 1);
        assert_eq!(stats.by_salience[&Salience::Low], 1);
        assert_eq!(stats.by_role[&MemoryRole::Resolution], 1);
        assert!(stats.estimated_tokens > 0);
        assert!(stats.compression_ratio_history.is_empty());
    }

    #[tokio::test]
    async fn test_suggest_pins_ranks_resolutions() {
        let engine = engine_at(0);

        engine
            .submit(
                "Fixed the memory leak in the worker pool",
                SubmitMetadata::new("/proj").with_salience(Salience::High),
            )
            .await
            .unwrap();
        engine
            .submit(
                "background chatter about lunch",
                SubmitMetadata::new("/proj").with_salience(Salience::Low),
            )
            .await
            .unwrap();

        let suggestions = engine.suggest_pins("/proj", 10).await.unwrap();

        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].gist.contains("memory leak"));
    }
}
