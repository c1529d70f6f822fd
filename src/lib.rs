//! # Memshed
//!
//! A local-first smart-forgetting engine for developer-tooling memories.
//!
//! ## Features
//!
//! - **🧠 Narrative role classification**: RESOLUTION > CAUSE >
//!   ATTEMPTED_FIX > CONTEXT > NOISE, fixed precedence, keyword-driven
//! - **🔍 Lossless entity preservation**: technical identifiers (errors,
//!   stack frames, paths, config keys, …) survive every compression
//! - **🗜️ Semantic consolidation**: groups of stale low-value memories
//!   collapse into one Cause → Fix → Result → Learning record
//! - **📌 Pinning**: pinned memories are immune to every mutating operation
//! - **⚖️ Interchangeable retention policies**: deterministic rules or
//!   tabular Q-learning with a persistent value table
//! - **📋 Forgetting ledger**: every removal, merge, or downgrade is
//!   recorded to an append-only audit trail before it becomes visible
//! - **🎯 Deterministic testing**: `SimClock` + `DeterministicRng` +
//!   `SimMemoryStore` make every retention decision reproducible
//!
//! ## Quick Start
//!
//! ```rust
//! use memshed::dst::SimClock;
//! use memshed::engine::{RetentionEngine, SubmitMetadata};
//! use memshed::policy::PolicyKind;
//! use memshed::storage::SimMemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = SimClock::new();
//! let engine = RetentionEngine::new(SimMemoryStore::new(), PolicyKind::RuleBased, clock.clone());
//!
//! // Ingest a memory
//! let record = engine
//!     .submit(
//!         "Fixed TypeError in auth.py: JWT timestamp mismatch",
//!         SubmitMetadata::new("/home/user/project").with_file_path("auth.py"),
//!     )
//!     .await?;
//! assert!(record.entities.error_types.contains("TypeError"));
//!
//! // Periodically evaluate retention
//! let report = engine.run_retention_cycle("/home/user/project", false).await?;
//! println!("action: {}", report.action);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RetentionEngine                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Aggregator │ RoleClassifier │ EntityExtractor │ Scorer  │
//! ├─────────────────────────────────────────────────────────┤
//! │ RetentionPolicy (rules | Q-learning)                    │
//! │ ConsolidationEngine      │ PinRegistry                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ MemoryStore trait        │ ForgettingLedger (append-only)│
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Control flow: new memory → aggregation (dedup/downgrade) → role
//! classification + entity extraction → retention scoring → stored.
//! Periodically, per project: the policy observes a fresh
//! [`RetentionContext`](policy::RetentionContext), chooses one
//! [`RetentionAction`](policy::RetentionAction), the engine executes it
//! (consulting the pin registry and writing ledger events), and the learned
//! policy updates its value table from the outcome.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregation;
pub mod classification;
pub mod consolidation;
pub mod constants;
pub mod dst;
pub mod engine;
pub mod extraction;
pub mod ledger;
pub mod pinning;
pub mod policy;
pub mod scoring;
pub mod storage;

// Re-export the common surface.
pub use aggregation::{
    cap_error_salience, downgraded_salience, AggregationConfig, Aggregator, Fingerprint,
    Fingerprinter,
};
pub use classification::{Classification, MemoryRole, RoleClassifier};
pub use consolidation::{
    CompressedMemory, ConsolidationConfig, ConsolidationEngine, ConsolidationOutcome,
};
pub use dst::{DeterministicRng, SimClock};
pub use engine::{
    CycleReport, EngineConfig, EngineError, ProjectStatistics, RetentionEngine, SubmitMetadata,
};
pub use extraction::{EntityExtractor, ExtractedEntities, StackFrame};
pub use ledger::{ForgettingLedger, LedgerEvent, LedgerEventType, LedgerStatus};
pub use pinning::{PinError, PinRegistry};
pub use policy::{
    LearnedPolicy, PolicyKind, PolicySnapshot, RetentionAction, RetentionContext,
    RetentionOutcome, RetentionPolicy, RewardProfile, RuleBasedPolicy,
};
pub use scoring::{RetentionScore, RetentionScorer};
pub use storage::{MemoryQuery, MemoryRecord, MemoryStore, Salience, SimMemoryStore, StoreError};
