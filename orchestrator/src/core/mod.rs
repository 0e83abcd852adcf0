//! Core business logic modules
//!
//! Planning and lifecycle logic with no channel I/O. Everything except the
//! state machine's recovery timer is synchronous and deterministic.

pub mod complexity;
pub mod decision;
pub mod partition;
pub mod performance;
pub mod routing;
pub mod state_machine;

pub use complexity::{analyze_complexity, ShardingEngine};
pub use decision::{DecisionAlgorithm, DecisionContext, DecisionEngine, DecisionResult, DomainMetrics};
pub use partition::{Partition, PartitionValidator, ValidationReport};
pub use performance::PerformanceTracker;
pub use routing::{route_file, route_task};
pub use state_machine::{OrchestratorEvent, OrchestratorState, StateMachine};
