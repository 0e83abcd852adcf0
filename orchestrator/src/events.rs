//! Typed notifications published by orchestrator components
//!
//! Components receive an `EventBus` at construction and publish into it;
//! observers subscribe for a broadcast receiver. Publishing never blocks and
//! never fails when nobody is listening.

use serde::Serialize;
use shared::Domain;
use tokio::sync::broadcast;

use crate::core::decision::DecisionAlgorithm;
use crate::core::state_machine::{OrchestratorEvent, OrchestratorState};

/// Everything an external observer can be told about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    DecisionMade {
        task_id: String,
        selected: Option<Domain>,
        confidence: f64,
        algorithm: DecisionAlgorithm,
    },
    StateChanged {
        from: OrchestratorState,
        to: OrchestratorState,
        event: OrchestratorEvent,
    },
    MessageSent {
        domain: Domain,
        message_id: String,
    },
    MessageReceived {
        domain: Domain,
        message_id: String,
    },
    MessageQueued {
        domain: Domain,
        message_id: String,
    },
    /// Retry budget exhausted; the message will not be delivered
    MessageFailed {
        domain: Domain,
        message_id: String,
        attempts: u32,
    },
    ChannelConnected {
        domain: Domain,
    },
    ChannelDisconnected {
        domain: Domain,
        unexpected: bool,
    },
    ChannelError {
        domain: Domain,
        error: String,
    },
    /// Hook for transport-specific reconnection
    ReconnectRequested {
        domain: Domain,
    },
    BalanceAdvisory {
        domain: Domain,
        load: f64,
        mean_load: f64,
        deviation: f64,
    },
}

/// Cloneable publisher handle around a broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
