//! Trait definitions with mockall annotations for testing
//!
//! Seams to the collaborators the orchestrator does not implement itself:
//! the byte-level channel to a worker pool, the worker pool's execution
//! contract, and the pattern store.

use std::collections::HashMap;
use std::sync::Arc;

use shared::{PatternMatch, Task, TaskResult};
use tokio::sync::mpsc;

use crate::error::OrchestratorResult;

/// Something observed on a channel's inbound side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One JSON text frame
    Frame(String),
    /// The remote end went away
    Closed,
    Error(String),
}

/// A worker channel as handed to the communicator: the outbound transport
/// plus the stream of inbound frames
pub struct ChannelHandle {
    pub transport: Arc<dyn Transport>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Outbound side of one bidirectional worker channel
#[mockall::automock]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one serialized message frame
    async fn transmit(&self, frame: String) -> OrchestratorResult<()>;

    /// Liveness check; an error marks the channel unhealthy
    async fn ping(&self) -> OrchestratorResult<()>;

    async fn close(&self) -> OrchestratorResult<()>;
}

/// Executes tasks for one domain
///
/// Failures are returned as errors; callers never assume success.
#[mockall::automock]
#[async_trait::async_trait]
pub trait WorkerPool: Send + Sync {
    async fn execute(&self, task: Task) -> OrchestratorResult<TaskResult>;
}

/// Persistent pattern memory; every call is best-effort
#[mockall::automock]
#[async_trait::async_trait]
pub trait PatternStore: Send + Sync {
    async fn search(&self, query: &str, limit: usize, min_similarity: f64) -> OrchestratorResult<Vec<PatternMatch>>;

    async fn store(&self, content: &str, tags: HashMap<String, String>) -> OrchestratorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Domain;

    #[tokio::test]
    async fn test_mock_worker_pool_reports_failure() {
        let mut pool = MockWorkerPool::new();
        pool.expect_execute()
            .returning(|task| Err(crate::error::OrchestratorError::worker(format!("cannot run {}", task.id))));

        let result = pool.execute(Task::new("t", "x", Domain::Development)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_pattern_store_search() {
        let mut store = MockPatternStore::new();
        store
            .expect_search()
            .withf(|query, limit, min| query == "auth" && *limit == 5 && *min == 0.7)
            .returning(|_, _, _| Ok(vec![]));

        assert!(store.search("auth", 5, 0.7).await.unwrap().is_empty());
    }
}
