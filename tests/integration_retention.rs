//! End-to-end retention scenarios over the sim store.
//!
//! Each test drives the public engine surface the way the surrounding
//! daemon/CLI would, and checks the audit guarantees the core exists to
//! provide.

use memshed::classification::MemoryRole;
use memshed::dst::SimClock;
use memshed::engine::{EngineConfig, RetentionEngine, SubmitMetadata};
use memshed::extraction::{EntityExtractor, ExtractedEntities};
use memshed::ledger::{LedgerEventType, LedgerStatus};
use memshed::policy::{PolicyKind, RetentionAction, RuleThresholds};
use memshed::storage::{Salience, SimMemoryStore};

const PROJECT: &str = "/home/user/project";

/// Distinct wording per index; the fingerprint normalizer strips digits, so
/// numbered texts would collide into one aggregated record.
fn unique_text(prefix: &str, i: usize) -> String {
    let a = (b'a' + (i / 26) as u8) as char;
    let b = (b'a' + (i % 26) as u8) as char;
    format!("{prefix} {a}{b} touched temp_buffer_{a}{b}")
}

fn rule_engine(clock: SimClock) -> RetentionEngine<SimMemoryStore> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    RetentionEngine::new(SimMemoryStore::new(), PolicyKind::RuleBased, clock)
}

// =============================================================================
// Scenario 1: classification + extraction on ingest
// =============================================================================

#[tokio::test]
async fn fixed_typeerror_classifies_as_resolution_with_entities() {
    let engine = rule_engine(SimClock::new());

    let record = engine
        .submit(
            "Fixed TypeError in auth.py: JWT timestamp mismatch",
            SubmitMetadata::new(PROJECT).with_file_path("auth.py"),
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
}

// =============================================================================
// Scenario 2: repetition-driven downgrade to NOISE
// =============================================================================

#[tokio::test]
async fn repeated_fingerprint_downgrades_through_schedule() {
    let engine = rule_engine(SimClock::new());
    let metadata = SubmitMetadata::new(PROJECT)
        .with_file_path("test.py")
        .with_line_number(42);

    let mut salience_at = Vec::new();
    for occurrence in 1..=25 {
        let record = engine
            .submit("SyntaxError: Unexpected token", metadata.clone())
            .await
            .unwrap();
        salience_at.push((occurrence, record.salience, record.occurrence_count));
    }

    // Error text enters capped at MEDIUM; then the schedule takes over.
    assert_eq!(salience_at[0].1, Salience::Medium);
    for &(occurrence, salience, count) in &salience_at {
        assert_eq!(count, occurrence);
        match occurrence {
            1 => assert_eq!(salience, Salience::Medium),
            2..=20 => assert_eq!(salience, Salience::Low, "occurrence {occurrence}"),
            _ => assert_eq!(salience, Salience::Noise, "occurrence {occurrence}"),
        }
    }

    // Monotonic: never upgrades across the run.
    for pair in salience_at.windows(2) {
        assert!(pair[1].1 <= pair[0].1);
    }

    // One stored record absorbed all 25 sightings.
    assert_eq!(engine.get_statistics(PROJECT).await.unwrap().total, 1);
}

// =============================================================================
// Scenario 3: 70-memory consolidation with exact ledger accounting
// =============================================================================

#[tokio::test]
async fn seventy_stale_memories_consolidate_into_one() {
    let clock = SimClock::new();
    let engine = RetentionEngine::with_config(
        SimMemoryStore::new(),
        PolicyKind::RuleBased,
        clock.clone(),
        EngineConfig::default().with_rule_thresholds(RuleThresholds {
            low_noise_count: 50,
            ..RuleThresholds::default()
        }),
    );

    let mut verbatims = Vec::new();
    for i in 0..70 {
        let text = unique_text("worker cleanup pass", i);
        engine
            .submit(
                &text,
                SubmitMetadata::new(PROJECT)
                    .with_salience(Salience::Low)
                    .with_file_path("main.py"),
            )
            .await
            .unwrap();
        verbatims.push(text);
    }
    clock.advance_days(40);

    let report = engine.run_retention_cycle(PROJECT, false).await.unwrap();

    assert_eq!(report.action, RetentionAction::ConsolidateAndDecay);
    assert_eq!(report.outcome.memories_before, 70);
    assert_eq!(report.outcome.memories_after, 1);

    // The surviving record is the consolidated one, carrying every entity.
    let stats = engine.get_statistics(PROJECT).await.unwrap();
    assert_eq!(stats.total, 1);

    let extractor = EntityExtractor::new();
    let expected_union = ExtractedEntities::union_of(
        verbatims
            .iter()
            .map(|v| extractor.extract(v))
            .collect::<Vec<_>>()
            .iter(),
    );

    let events = engine.get_ledger(Some(PROJECT), 10).await.unwrap();
    let consolidation = events
        .iter()
        .find(|e| e.event_type == LedgerEventType::Consolidation)
        .expect("consolidation event");

    assert_eq!(consolidation.memories_before, 70);
    assert_eq!(consolidation.memories_after, 1);
    assert_eq!(consolidation.removed_ids.len(), 70);
    assert_eq!(consolidation.entities_preserved, expected_union.count());
    assert_eq!(consolidation.status, LedgerStatus::Confirmed);
}

// =============================================================================
// Scenario 4: pinned memories are excluded from consolidation
// =============================================================================

#[tokio::test]
async fn pinned_memory_survives_consolidation_of_its_group() {
    let clock = SimClock::new();
    let engine = RetentionEngine::with_config(
        SimMemoryStore::new(),
        PolicyKind::RuleBased,
        clock.clone(),
        EngineConfig::default().with_rule_thresholds(RuleThresholds {
            low_noise_count: 50,
            ..RuleThresholds::default()
        }),
    );

    for i in 0..70 {
        engine
            .submit(
                &unique_text("worker cleanup pass", i),
                SubmitMetadata::new(PROJECT)
                    .with_salience(Salience::Low)
                    .with_file_path("main.py"),
            )
            .await
            .unwrap();
    }
    // Matches every eligibility filter except `pinned`.
    let protected = engine
        .submit(
            "critical stale note kept on purpose",
            SubmitMetadata::new(PROJECT)
                .with_salience(Salience::Low)
                .with_file_path("main.py"),
        )
        .await
        .unwrap();
    engine.pin(&protected.id, "critical").await.unwrap();

    clock.advance_days(40);

    let report = engine.run_retention_cycle(PROJECT, false).await.unwrap();
    assert!(report.action.is_mutating());

    // The pinned record survived untouched.
    let stats = engine.get_statistics(PROJECT).await.unwrap();
    assert_eq!(stats.total, 2); // compressed record + pinned record
    assert_eq!(stats.pinned, 1);

    let events = engine.get_ledger(Some(PROJECT), 10).await.unwrap();
    for event in &events {
        assert!(
            !event.removed_ids.contains(&protected.id),
            "pinned id must never appear in removed_ids"
        );
    }
}

// =============================================================================
// Scenario 5: deterministic rule decision at 130 LOW/NOISE
// =============================================================================

#[tokio::test]
async fn rule_policy_consolidates_at_130_low_noise_every_time() {
    use memshed::policy::{RetentionContext, RetentionPolicy, RuleBasedPolicy};

    let context = RetentionContext {
        project_path: "/test".to_string(),
        total_memories: 150,
        high_count: 20,
        low_count: 100,
        noise_count: 30,
        avg_age_days: 15.0,
        oldest_age_days: 30.0,
        estimated_tokens: 15_000,
        ..RetentionContext::default()
    };

    let mut policy = RuleBasedPolicy::new();
    for _ in 0..10 {
        assert_eq!(
            policy.decide(&context),
            RetentionAction::ConsolidateAndDecay
        );
    }
}

// =============================================================================
// Scenario 6: learned policy trains over repeated cycles
// =============================================================================

#[tokio::test]
async fn learned_policy_updates_table_and_decays_epsilon() {
    use memshed::dst::DeterministicRng;
    use memshed::policy::{
        LearnedPolicy, RetentionContext, RetentionOutcome, RetentionPolicy, RewardProfile,
    };

    let context = RetentionContext {
        project_path: "/test".to_string(),
        total_memories: 150,
        high_count: 20,
        low_count: 100,
        noise_count: 30,
        estimated_tokens: 15_000,
        ..RetentionContext::default()
    };

    let mut policy = LearnedPolicy::new(RewardProfile::Balanced, DeterministicRng::new(42));
    let mut epsilons = vec![policy.epsilon()];

    for _ in 0..3 {
        let action = policy.decide(&context);
        let outcome = RetentionOutcome {
            action,
            memories_before: 150,
            memories_after: 90,
            tokens_saved: 4_000,
            ..RetentionOutcome::default()
        };
        policy.learn(&context, action, &outcome);
        epsilons.push(policy.epsilon());
    }

    assert!(policy.q_table().nonzero_values() > 0);
    for pair in epsilons.windows(2) {
        assert!(pair[1] < pair[0], "epsilon must strictly decrease");
    }
}

// =============================================================================
// Ledger completeness across a full mutating cycle
// =============================================================================

#[tokio::test]
async fn ledger_deltas_match_actual_count_change() {
    let clock = SimClock::new();
    let engine = RetentionEngine::with_config(
        SimMemoryStore::new(),
        PolicyKind::RuleBased,
        clock.clone(),
        EngineConfig::default().with_rule_thresholds(RuleThresholds {
            low_noise_count: 30,
            ..RuleThresholds::default()
        }),
    );

    // Two consolidation groups plus decay-eligible noise.
    for i in 0..20 {
        engine
            .submit(
                &unique_text("alpha worker pass", i),
                SubmitMetadata::new(PROJECT)
                    .with_salience(Salience::Low)
                    .with_file_path("alpha.py"),
            )
            .await
            .unwrap();
    }
    for i in 0..20 {
        engine
            .submit(
                &unique_text("beta worker pass", i),
                SubmitMetadata::new(PROJECT)
                    .with_salience(Salience::Noise)
                    .with_file_path("beta.py"),
            )
            .await
            .unwrap();
    }
    let total_before = engine.get_statistics(PROJECT).await.unwrap().total;
    assert_eq!(total_before, 40);

    clock.advance_days(40);
    engine.run_retention_cycle(PROJECT, false).await.unwrap();

    let total_after = engine.get_statistics(PROJECT).await.unwrap().total;
    let events = engine.get_ledger(Some(PROJECT), 100).await.unwrap();

    let ledger_delta: i64 = events.iter().map(|e| e.count_delta()).sum();
    assert_eq!(
        ledger_delta,
        total_before as i64 - total_after as i64,
        "every count change must be accounted for by exactly one event"
    );
    assert!(events
        .iter()
        .all(|e| e.status == LedgerStatus::Confirmed));
}

// =============================================================================
// Dry run never touches storage or the ledger
// =============================================================================

#[tokio::test]
async fn dry_run_projects_without_mutation() {
    let clock = SimClock::new();
    let engine = RetentionEngine::with_config(
        SimMemoryStore::new(),
        PolicyKind::RuleBased,
        clock.clone(),
        EngineConfig::default().with_rule_thresholds(RuleThresholds {
            low_noise_count: 30,
            ..RuleThresholds::default()
        }),
    );

    for i in 0..40 {
        engine
            .submit(
                &unique_text("gamma worker pass", i),
                SubmitMetadata::new(PROJECT)
                    .with_salience(Salience::Low)
                    .with_file_path("gamma.py"),
            )
            .await
            .unwrap();
    }
    clock.advance_days(40);

    let dry = engine.run_retention_cycle(PROJECT, true).await.unwrap();
    assert!(dry.dry_run);
    assert!(dry.outcome.memories_after < dry.outcome.memories_before);

    assert_eq!(engine.get_statistics(PROJECT).await.unwrap().total, 40);
    assert!(engine.get_ledger(Some(PROJECT), 10).await.unwrap().is_empty());

    // The wet run then performs what the dry run projected.
    let wet = engine.run_retention_cycle(PROJECT, false).await.unwrap();
    assert_eq!(wet.action, dry.action);
    assert_eq!(wet.outcome.memories_after, dry.outcome.memories_after);
}

// =============================================================================
// Compression ratio history feeds statistics
// =============================================================================

#[tokio::test]
async fn statistics_track_compression_history() {
    let clock = SimClock::new();
    let engine = RetentionEngine::with_config(
        SimMemoryStore::new(),
        PolicyKind::RuleBased,
        clock.clone(),
        EngineConfig::default().with_rule_thresholds(RuleThresholds {
            low_noise_count: 10,
            ..RuleThresholds::default()
        }),
    );

    for i in 0..20 {
        engine
            .submit(
                &unique_text("delta worker pass", i),
                SubmitMetadata::new(PROJECT)
                    .with_salience(Salience::Low)
                    .with_file_path("delta.py"),
            )
            .await
            .unwrap();
    }
    clock.advance_days(40);
    engine.run_retention_cycle(PROJECT, false).await.unwrap();

    let stats = engine.get_statistics(PROJECT).await.unwrap();
    assert_eq!(stats.compression_ratio_history.len(), 1);
    assert!(stats.compression_ratio_history[0] > 0.0);
}
