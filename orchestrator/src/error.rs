//! Orchestrator-specific error types

use shared::{Domain, SharedError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid task {task_id}: {reason}")]
    InvalidTask { task_id: String, reason: String },

    #[error("Sharding failed for task {task_id}: {reason}")]
    ShardingError { task_id: String, reason: String },

    #[error("No channel registered for domain {domain}")]
    ChannelNotFound { domain: Domain },

    #[error("Transport failure on {domain} channel: {message}")]
    TransportError { domain: Domain, message: String },

    #[error("Orchestrator is not accepting work in state {state}")]
    NotAccepting { state: String },

    #[error("Worker execution failed: {message}")]
    WorkerError { message: String },

    #[error("Pattern store operation failed: {message}")]
    PatternStoreError { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn transport(domain: Domain, message: impl Into<String>) -> Self {
        Self::TransportError {
            domain,
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn invalid_task(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTask {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::WorkerError {
            message: message.into(),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
