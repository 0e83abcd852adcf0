//! Orchestrator library for coordinating hierarchical task execution
//!
//! Splits oversized tasks into shards, checks that the resulting partitions
//! are mutually exclusive and collectively exhaustive, picks a worker domain
//! for each partition and delivers the assignments over reliable channels,
//! all under an explicit lifecycle state machine.

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use core::{
    DecisionAlgorithm, DecisionEngine, OrchestratorEvent, OrchestratorState, PartitionValidator, PerformanceTracker,
    ShardingEngine, StateMachine,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use events::{EventBus, Notification};
pub use orchestrator::{Assignment, AssignmentStatus, Orchestrator, OrchestratorStatus, SubmissionReport};
pub use services::{InProcessTransport, WorkerCommunicator, WorkerRunner};
pub use traits::{ChannelHandle, PatternStore, Transport, TransportEvent, WorkerPool};
