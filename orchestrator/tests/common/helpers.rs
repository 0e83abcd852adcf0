//! Test helpers and builder patterns for orchestrator tests

use std::sync::Arc;
use std::time::Duration;

use orchestrator::traits::{MockPatternStore, MockWorkerPool};
use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorState};
use shared::{Domain, TaskResult};

use super::fixtures::TestFixtures;

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds started orchestrators with mock workers attached
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    workers: Vec<Domain>,
    pattern_store: Option<MockPatternStore>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: TestFixtures::fast_config(),
            workers: Domain::ALL.to_vec(),
            pattern_store: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Only these domains get a worker; the rest stay unconnected
    pub fn with_workers(mut self, domains: &[Domain]) -> Self {
        self.workers = domains.to_vec();
        self
    }

    pub fn with_pattern_store(mut self, store: MockPatternStore) -> Self {
        self.pattern_store = Some(store);
        self
    }

    pub async fn build(self) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(self.config).expect("valid config");
        if let Some(store) = self.pattern_store {
            orchestrator = orchestrator.with_pattern_store(Arc::new(store));
        }
        orchestrator.start().await.expect("start");
        for domain in self.workers {
            orchestrator
                .attach_worker(domain, Arc::new(TestHelpers::succeeding_pool(domain)))
                .await;
        }
        orchestrator
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TestHelpers;

impl TestHelpers {
    pub fn succeeding_pool(domain: Domain) -> MockWorkerPool {
        let mut pool = MockWorkerPool::new();
        pool.expect_execute()
            .returning(move |task| Ok(TaskResult::completed(task.id, domain, 5)))
            .times(0..);
        pool
    }

    /// Pattern store that finds nothing and accepts everything
    pub fn quiet_pattern_store() -> MockPatternStore {
        let mut store = MockPatternStore::new();
        store.expect_search().returning(|_, _, _| Ok(vec![])).times(0..);
        store.expect_store().returning(|_, _| Ok(())).times(0..);
        store
    }

    /// Pump inbound traffic until the orchestrator is back in `Active`
    pub async fn settle(orchestrator: &mut Orchestrator) {
        let settled = tokio::time::timeout(SETTLE_TIMEOUT, async {
            loop {
                orchestrator.process_pending().await;
                if orchestrator.state_machine().current_state().await == OrchestratorState::Active {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "orchestrator did not return to Active");
    }
}
