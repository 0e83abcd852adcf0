//! Channel envelope shared by the orchestrator and worker pools

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{SharedError, SharedResult};
use crate::types::{Priority, ProcessId};

/// Kind of message carried by the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Orchestrator → worker: execute a task or shard
    TaskAssignment,
    /// Worker → orchestrator: task finished
    TaskResult,
    /// Worker → orchestrator: task could not be executed
    TaskFailure,
    /// Liveness check and its reply
    Heartbeat,
    /// Fan-out notice to every worker
    Broadcast,
    /// Anything else the two ends agree on
    Control,
}

/// Wire message: `{id, type, source, target, payload, timestamp, priority, retryCount}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub source: ProcessId,
    pub target: ProcessId,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub retry_count: u32,
}

impl Message {
    pub fn new(
        message_type: MessageType,
        source: ProcessId,
        target: ProcessId,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            source,
            target,
            payload,
            timestamp: Utc::now(),
            priority,
            retry_count: 0,
        }
    }

    /// Serialize to the JSON text frame sent over a channel
    pub fn to_frame(&self) -> SharedResult<String> {
        serde_json::to_string(self).map_err(|e| SharedError::SerializationError {
            message: e.to_string(),
        })
    }

    /// Parse a JSON text frame received from a channel
    pub fn from_frame(frame: &str) -> SharedResult<Self> {
        serde_json::from_str(frame).map_err(|e| SharedError::DeserializationError {
            message: e.to_string(),
        })
    }

    /// Decode the payload into a typed structure
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> SharedResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| SharedError::ProtocolError {
            message: format!("{:?} payload rejected: {e}", self.message_type),
        })
    }
}
