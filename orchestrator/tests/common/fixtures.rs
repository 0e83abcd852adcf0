//! Test fixtures: canonical tasks and configurations

use orchestrator::OrchestratorConfig;
use shared::{Domain, Priority, Task};

pub struct TestFixtures;

impl TestFixtures {
    pub const SCENARIO_TASK_ID: &'static str = "T1";
    /// 6 files * 10 + 3 dependencies * 5 + 1500 / 50 + critical 40
    pub const SCENARIO_COMPLEXITY: f64 = 145.0;

    /// Six files spanning five domains, one of them also a dependency
    pub fn scenario_task() -> Task {
        Task::new(Self::SCENARIO_TASK_ID, "Implement payment flow", Domain::Development)
            .with_files([
                "src/payment.ts",
                "src/payment.test.ts",
                "config/payment.yaml",
                "src/auth/token.ts",
                "docs/payment.md",
                "src/checkout.ts",
            ])
            .with_dependencies(["stripe", "lodash", "src/checkout.ts"])
            .with_estimated_size(1500)
            .with_priority(Priority::Critical)
    }

    /// Below every threshold; routed by its test file
    pub fn small_qa_task(id: &str) -> Task {
        Task::new(id, "Add regression test", Domain::Quality)
            .with_files(["src/cart.test.ts"])
            .with_priority(Priority::Low)
    }

    /// Defaults with timers shortened for tests
    pub fn fast_config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.communication.retry_interval_ms = 20;
        config.communication.retry_delay_ms = 10;
        config.communication.heartbeat_interval_ms = 50;
        config.communication.reconnect_delay_ms = 10;
        config.state_machine.recovery_delay_ms = 50;
        config
    }
}
