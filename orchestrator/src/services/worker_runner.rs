//! Worker-side channel adapter
//!
//! Drives a `WorkerPool` from the worker end of a channel: executes task
//! assignments, reports results or failures, and answers heartbeats.

use std::sync::Arc;
use std::time::Instant;

use shared::{
    process_debug, process_warn, AssignmentPayload, Domain, FailurePayload, Message, MessageType, ProcessId,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::OrchestratorResult;
use crate::traits::{ChannelHandle, Transport, TransportEvent, WorkerPool};

pub struct WorkerRunner {
    domain: Domain,
    pool: Arc<dyn WorkerPool>,
    transport: Arc<dyn Transport>,
    inbound: mpsc::Receiver<TransportEvent>,
}

impl WorkerRunner {
    pub fn new(domain: Domain, pool: Arc<dyn WorkerPool>, handle: ChannelHandle) -> Self {
        Self {
            domain,
            pool,
            transport: handle.transport,
            inbound: handle.inbound,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve the channel until the orchestrator closes it
    pub async fn run(mut self) {
        let process = ProcessId::Worker(self.domain);
        while let Some(event) = self.inbound.recv().await {
            match event {
                TransportEvent::Frame(frame) => {
                    if let Err(e) = self.handle_frame(&frame).await {
                        process_warn!(process, "⚠️ Reply failed: {}", e);
                    }
                }
                TransportEvent::Error(error) => {
                    process_warn!(process, "⚠️ Channel error: {}", error);
                }
                TransportEvent::Closed => break,
            }
        }
        process_debug!(process, "👋 Worker runner stopped");
    }

    async fn handle_frame(&self, frame: &str) -> OrchestratorResult<()> {
        let message = match Message::from_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                process_warn!(ProcessId::Worker(self.domain), "⚠️ Ignoring unparseable frame: {}", e);
                return Ok(());
            }
        };

        let reply = match message.message_type {
            MessageType::TaskAssignment => self.execute_assignment(&message).await,
            MessageType::Heartbeat => self.reply(MessageType::Heartbeat, serde_json::Value::Null, &message),
            other => {
                process_debug!(ProcessId::Worker(self.domain), "📨 Ignoring {:?} message", other);
                return Ok(());
            }
        };

        self.transport.transmit(reply.to_frame()?).await
    }

    async fn execute_assignment(&self, message: &Message) -> Message {
        let assignment: AssignmentPayload = match message.payload_as() {
            Ok(assignment) => assignment,
            Err(e) => return self.failure(message.id.clone(), e.to_string(), message),
        };

        let assignment_id = assignment.assignment_id.clone();
        process_debug!(ProcessId::Worker(self.domain), "🛠️ Executing {}", assignment_id);
        let started = Instant::now();

        match self.pool.execute(assignment.task).await {
            Ok(mut result) => {
                result.task_id = assignment_id.clone();
                result.metadata.domain.get_or_insert(self.domain);
                if result.metadata.duration_ms == 0 {
                    result.metadata.duration_ms = started.elapsed().as_millis() as u64;
                }
                match serde_json::to_value(&result) {
                    Ok(payload) => self.reply(MessageType::TaskResult, payload, message),
                    Err(e) => self.failure(assignment_id, e.to_string(), message),
                }
            }
            Err(e) => self.failure(assignment_id, e.to_string(), message),
        }
    }

    fn failure(&self, assignment_id: String, reason: String, request: &Message) -> Message {
        let payload = FailurePayload { assignment_id, reason };
        let value = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        self.reply(MessageType::TaskFailure, value, request)
    }

    fn reply(&self, message_type: MessageType, payload: serde_json::Value, request: &Message) -> Message {
        Message::new(
            message_type,
            ProcessId::Worker(self.domain),
            request.source,
            payload,
            request.priority,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::services::InProcessTransport;
    use crate::traits::MockWorkerPool;
    use shared::{Priority, Task, TaskResult};

    async fn next_message(handle: &mut ChannelHandle) -> Message {
        match handle.inbound.recv().await {
            Some(TransportEvent::Frame(frame)) => Message::from_frame(&frame).unwrap(),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    fn assignment(id: &str) -> Message {
        let payload = AssignmentPayload {
            assignment_id: id.to_string(),
            task: Task::new(id, "x", Domain::Quality),
            depends_on: vec![],
        };
        Message::new(
            MessageType::TaskAssignment,
            ProcessId::Orchestrator,
            ProcessId::Worker(Domain::Quality),
            serde_json::to_value(payload).unwrap(),
            Priority::High,
        )
    }

    #[tokio::test]
    async fn test_assignment_produces_result() {
        let mut pool = MockWorkerPool::new();
        pool.expect_execute()
            .times(1)
            .returning(|task| Ok(TaskResult::completed(task.id, Domain::Quality, 12)));

        let (mut orchestrator, worker) = InProcessTransport::pair(Domain::Quality);
        let runner = WorkerRunner::new(Domain::Quality, Arc::new(pool), worker).spawn();

        let request = assignment("T1");
        orchestrator.transport.transmit(request.to_frame().unwrap()).await.unwrap();

        let reply = next_message(&mut orchestrator).await;
        assert_eq!(reply.message_type, MessageType::TaskResult);
        assert_eq!(reply.source, ProcessId::Worker(Domain::Quality));
        assert_eq!(reply.target, ProcessId::Orchestrator);
        let result: TaskResult = reply.payload_as().unwrap();
        assert_eq!(result.task_id, "T1");
        assert_eq!(result.metadata.duration_ms, 12);

        orchestrator.transport.close().await.unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_pool_error_becomes_failure_report() {
        let mut pool = MockWorkerPool::new();
        pool.expect_execute()
            .returning(|_| Err(OrchestratorError::worker("disk full")));

        let (mut orchestrator, worker) = InProcessTransport::pair(Domain::Quality);
        WorkerRunner::new(Domain::Quality, Arc::new(pool), worker).spawn();

        orchestrator
            .transport
            .transmit(assignment("T2").to_frame().unwrap())
            .await
            .unwrap();

        let reply = next_message(&mut orchestrator).await;
        assert_eq!(reply.message_type, MessageType::TaskFailure);
        let failure: FailurePayload = reply.payload_as().unwrap();
        assert_eq!(failure.assignment_id, "T2");
        assert!(failure.reason.contains("disk full"));
    }

    #[tokio::test]
    async fn test_heartbeat_is_answered() {
        let (mut orchestrator, worker) = InProcessTransport::pair(Domain::Research);
        WorkerRunner::new(Domain::Research, Arc::new(MockWorkerPool::new()), worker).spawn();

        let heartbeat = Message::new(
            MessageType::Heartbeat,
            ProcessId::Orchestrator,
            ProcessId::Worker(Domain::Research),
            serde_json::Value::Null,
            Priority::Low,
        );
        orchestrator.transport.transmit(heartbeat.to_frame().unwrap()).await.unwrap();

        assert_eq!(next_message(&mut orchestrator).await.message_type, MessageType::Heartbeat);
    }
}
