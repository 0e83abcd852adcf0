//! Typed payloads carried inside `Message::payload`

use serde::{Deserialize, Serialize};

use crate::types::Task;

/// Payload of a `TaskAssignment` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    /// Task or shard id the worker must report back against
    pub assignment_id: String,
    pub task: Task,
    /// Shards that must finish first
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Payload of a `TaskFailure` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePayload {
    pub assignment_id: String,
    pub reason: String,
}
