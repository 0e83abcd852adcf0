//! Component tests through the public library surface
//!
//! Exercise the planning components the way the orchestrator wires them:
//! sharding, partition validation and correction, algorithm selection,
//! the lifecycle table and configuration loading.

use std::io::Write;

use orchestrator::core::partition::{Partition, Severity};
use orchestrator::{
    DecisionAlgorithm, DecisionEngine, EventBus, Notification, OrchestratorConfig, OrchestratorEvent,
    OrchestratorState, PartitionValidator, ShardingEngine, StateMachine,
};
use shared::{Domain, Priority, Task};

mod common;
use common::TestFixtures;

fn validator() -> (PartitionValidator, EventBus) {
    let config = OrchestratorConfig::default();
    let events = EventBus::default();
    let validator = PartitionValidator::new(config.partition, config.domains, events.clone());
    (validator, events)
}

fn files(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Sharding the scenario task keeps every file exactly once
#[test]
fn test_sharding_scenario_is_mece() {
    // Arrange
    let config = OrchestratorConfig::default();
    let engine = ShardingEngine::new(config.sharding, config.domains.clone());
    let task = TestFixtures::scenario_task();
    let (mut validator, _events) = validator();

    // Act
    let shards = engine.shard(&task).unwrap();
    let partitions: Vec<Partition> = shards
        .iter()
        .map(|s| Partition::new(s.assigned_domain, s.subtask.clone()))
        .collect();
    let report = validator.validate(&partitions, &task.files);

    // Assert
    assert!(engine.should_shard(&task));
    assert!(report.valid);
    assert_eq!(report.coverage_percent, 100.0);
    assert_eq!(shards.iter().map(|s| s.subtask.estimated_size).sum::<u64>(), 1500);
}

/// Two domains claiming one file is a medium overlap and left alone
#[test]
fn test_shared_file_overlap_is_reported() {
    // Arrange
    let (mut validator, _events) = validator();
    let partitions = vec![
        Partition::new(
            Domain::Development,
            Task::new("a", "build", Domain::Development).with_files(["src/a.ts", "src/shared.ts"]),
        ),
        Partition::new(
            Domain::Quality,
            Task::new("b", "test", Domain::Quality).with_files(["src/shared.ts", "src/a.test.ts"]),
        ),
    ];
    let full = files(&["src/a.ts", "src/shared.ts", "src/a.test.ts"]);

    // Act
    let report = validator.validate(&partitions, &full);
    let corrected = validator.correct(&partitions, &report);

    // Assert
    assert!(!report.valid);
    assert_eq!(report.coverage_percent, 100.0);
    assert_eq!(report.overlaps.len(), 1);
    assert_eq!(report.overlaps[0].resource, "src/shared.ts");
    assert_eq!(report.overlaps[0].severity, Severity::Medium);
    assert!(report.gaps.is_empty());
    assert!(!report.suggestions.is_empty());
    assert_eq!(corrected, partitions);
}

/// High overlaps get one owner and gaps get synthesized work
#[test]
fn test_correction_restores_mece() {
    // Arrange
    let (mut validator, _events) = validator();
    let partitions = vec![
        Partition::new(
            Domain::Development,
            Task::new("a", "build", Domain::Development).with_files(["src/a.ts", "src/app.test.ts"]),
        ),
        Partition::new(
            Domain::Quality,
            Task::new("b", "test", Domain::Quality).with_files(["src/app.test.ts"]),
        ),
        Partition::new(
            Domain::Security,
            Task::new("c", "audit", Domain::Security).with_files(["src/app.test.ts"]),
        ),
    ];
    let full = files(&["src/a.ts", "src/app.test.ts", "docs/guide.md", "dep:serde"]);

    // Act
    let report = validator.validate(&partitions, &full);
    let corrected = validator.correct(&partitions, &report);
    let revalidated = validator.validate(&corrected, &full);

    // Assert
    assert_eq!(report.overlaps[0].severity, Severity::High);
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].resource, "docs/guide.md");

    assert!(revalidated.valid, "{revalidated:?}");
    let owner = corrected
        .iter()
        .find(|p| p.task.files.contains(&"src/app.test.ts".to_string()))
        .unwrap();
    assert_eq!(owner.domain, Domain::Quality);
    let gap = corrected.iter().find(|p| p.task.id == "gap-1").unwrap();
    assert_eq!(gap.domain, Domain::Research);
    assert_eq!(validator.metrics().corrections_applied, 2);
}

/// Balance analysis flags outliers without moving work
#[tokio::test]
async fn test_balance_advisory_is_published() {
    // Arrange
    let (validator, events) = validator();
    let mut rx = events.subscribe();
    let partitions = vec![
        Partition::new(
            Domain::Development,
            Task::new("a", "big", Domain::Development)
                .with_files(["src/a.ts"])
                .with_estimated_size(900),
        ),
        Partition::new(
            Domain::Quality,
            Task::new("b", "small", Domain::Quality)
                .with_files(["src/a.test.ts"])
                .with_estimated_size(10),
        ),
    ];

    // Act
    let report = validator.analyze_balance(&partitions);

    // Assert
    assert!(!report.imbalanced.is_empty());
    let advisory = rx.try_recv().unwrap();
    assert!(matches!(advisory, Notification::BalanceAdvisory { .. }));
}

/// Algorithm precedence: complexity, then capabilities, then load
#[test]
fn test_algorithm_selection_precedence() {
    // Arrange
    let engine = DecisionEngine::new(OrchestratorConfig::default().decision, EventBus::default());
    let candidates = vec![Domain::Development, Domain::Quality];
    let plain = Task::new("p", "write code", Domain::Development).with_priority(Priority::Low);
    let capable = plain.clone().with_capabilities(["testing"]);
    let heavy = capable.clone().with_files((0..20).map(|i| format!("src/f{i}.rs")));

    let context = |task: &Task, load: f64| {
        orchestrator::core::DecisionContext::new(task.clone(), candidates.clone()).with_load(load)
    };

    // Act & Assert
    assert_eq!(engine.select_algorithm(&context(&heavy, 0.9)), DecisionAlgorithm::Hybrid);
    assert_eq!(
        engine.select_algorithm(&context(&capable, 0.9)),
        DecisionAlgorithm::CapabilityMatching
    );
    assert_eq!(engine.select_algorithm(&context(&plain, 0.9)), DecisionAlgorithm::LoadBalancing);
    assert_eq!(engine.select_algorithm(&context(&plain, 0.1)), DecisionAlgorithm::WeightedScoring);
}

/// The canonical lifecycle path and a rejected shortcut
#[tokio::test]
async fn test_lifecycle_path() {
    // Arrange
    let machine = StateMachine::new(OrchestratorConfig::default().state_machine, EventBus::default());

    // Act & Assert
    assert!(!machine.process_event(OrchestratorEvent::TaskReceived).await);
    for (event, expected) in [
        (OrchestratorEvent::Initialize, OrchestratorState::Initializing),
        (OrchestratorEvent::ActivationComplete, OrchestratorState::Active),
        (OrchestratorEvent::TaskReceived, OrchestratorState::Coordinating),
        (OrchestratorEvent::CoordinationComplete, OrchestratorState::Active),
        (OrchestratorEvent::ShutdownInitiated, OrchestratorState::ShuttingDown),
        (OrchestratorEvent::ShutdownComplete, OrchestratorState::Shutdown),
    ] {
        assert!(machine.process_event(event).await, "{event:?} rejected");
        assert_eq!(machine.current_state().await, expected);
    }
    assert_eq!(machine.history().await.len(), 6);
}

/// Configuration files only need the fields they change
#[test]
fn test_config_file_overrides_defaults() {
    // Arrange
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"domains": ["development", "quality"], "sharding": {{"complexity_threshold": 50.0}}}}"#
    )
    .unwrap();

    // Act
    let config = OrchestratorConfig::from_json_file(file.path()).unwrap();

    // Assert
    assert_eq!(config.domains, vec![Domain::Development, Domain::Quality]);
    assert_eq!(config.sharding.complexity_threshold, 50.0);
    assert_eq!(config.sharding.max_files_per_task, 20);
    assert_eq!(config.communication.default_max_retries, 3);
}
