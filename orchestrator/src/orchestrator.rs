//! Main orchestrator implementation
//!
//! Accepts tasks, splits oversized ones, checks the partition set, picks a
//! domain per partition and hands the assignments to the communication layer.
//! Completion and failure reports flow back through the same channels and
//! drive the lifecycle state machine.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shared::{
    logging, process_debug, process_error, process_info, process_warn, AssignmentPayload, Domain, FailurePayload,
    Message, MessageType, ProcessId, Task, TaskResult,
};

use crate::config::OrchestratorConfig;
use crate::core::decision::{DecisionAlgorithm, DecisionContext, DecisionEngine, DecisionMetrics, DecisionResult, DomainMetrics};
use crate::core::partition::{
    BalanceReport, Partition, PartitionMetrics, PartitionValidator, ValidationReport, DEPENDENCY_PREFIX,
};
use crate::core::performance::{DomainPerformance, PerformanceTracker};
use crate::core::routing::route_task;
use crate::core::state_machine::{OrchestratorEvent, OrchestratorState, StateMachine, StateMetrics};
use crate::core::ShardingEngine;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::EventBus;
use crate::services::communicator::CommunicatorMetrics;
use crate::services::{DeliveryReport, InProcessTransport, WorkerCommunicator, WorkerRunner};
use crate::traits::{ChannelHandle, PatternStore, WorkerPool};

const PATTERN_SEARCH_LIMIT: usize = 5;
const PATTERN_MIN_SIMILARITY: f64 = 0.7;
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Handed to a connected channel
    Dispatched,
    /// Waiting in the retry queue
    Queued,
    Completed,
    Failed,
}

/// One partition handed to one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub original_task_id: String,
    pub description: String,
    pub domain: Domain,
    pub message_id: String,
    pub status: AssignmentStatus,
    pub depends_on: Vec<String>,
    pub algorithm: DecisionAlgorithm,
    pub confidence: f64,
    pub assigned_at: DateTime<Utc>,
}

/// What happened to a submitted task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReport {
    pub task_id: String,
    pub complexity: f64,
    pub sharded: bool,
    pub pattern_matches: usize,
    pub validation: ValidationReport,
    /// Present when the correction pass ran
    pub corrected_validation: Option<ValidationReport>,
    pub decisions: Vec<DecisionResult>,
    pub assignments: Vec<Assignment>,
    pub balance: BalanceReport,
}

impl SubmissionReport {
    /// Every partition found a domain
    pub fn fully_assigned(&self) -> bool {
        self.decisions.iter().all(|d| d.success)
    }
}

/// Read-only snapshot for monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorStatus {
    pub state: OrchestratorState,
    pub state_metrics: StateMetrics,
    pub decisions: DecisionMetrics,
    pub communication: CommunicatorMetrics,
    pub partitions: PartitionMetrics,
    pub performance: HashMap<Domain, DomainPerformance>,
    pub active_assignments: Vec<Assignment>,
    pub queue_depth: usize,
}

/// Main orchestrator that coordinates the worker domains
pub struct Orchestrator {
    config: OrchestratorConfig,
    events: EventBus,
    state_machine: StateMachine,
    sharding: ShardingEngine,
    decisions: DecisionEngine,
    validator: PartitionValidator,
    performance: PerformanceTracker,
    communicator: WorkerCommunicator,
    pattern_store: Option<Arc<dyn PatternStore>>,

    /// In-flight assignments keyed by assignment id (task or shard id)
    assignments: HashMap<String, Assignment>,
    /// Only messages whose assignment is still in flight
    message_to_assignment: HashMap<String, String>,
    /// Settled assignments, oldest first
    settled: VecDeque<Assignment>,
    workers: Vec<JoinHandle<()>>,

    inbound_rx: mpsc::Receiver<(Domain, Message)>,
    deliveries_rx: mpsc::UnboundedReceiver<DeliveryReport>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> OrchestratorResult<Self> {
        config.validate()?;

        let events = EventBus::default();
        let (communicator, receivers) = WorkerCommunicator::new(config.communication.clone(), events.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Self {
            state_machine: StateMachine::new(config.state_machine.clone(), events.clone()),
            sharding: ShardingEngine::new(config.sharding.clone(), config.domains.clone()),
            decisions: DecisionEngine::new(config.decision.clone(), events.clone()),
            validator: PartitionValidator::new(config.partition.clone(), config.domains.clone(), events.clone()),
            performance: PerformanceTracker::new(),
            communicator,
            pattern_store: None,
            assignments: HashMap::new(),
            message_to_assignment: HashMap::new(),
            settled: VecDeque::new(),
            workers: Vec::new(),
            inbound_rx: receivers.inbound,
            deliveries_rx: receivers.deliveries,
            shutdown_tx,
            shutdown_rx,
            events,
            config,
        })
    }

    pub fn with_pattern_store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.pattern_store = Some(store);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state_machine
    }

    pub fn communicator(&self) -> &WorkerCommunicator {
        &self.communicator
    }

    pub fn get_shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Bring the lifecycle to `Active` and start the channel timers
    pub async fn start(&mut self) -> OrchestratorResult<()> {
        if !self.state_machine.process_event(OrchestratorEvent::Initialize).await {
            return Err(self.not_accepting().await);
        }
        self.communicator.start().await;
        if !self.state_machine.process_event(OrchestratorEvent::ActivationComplete).await {
            return Err(self.not_accepting().await);
        }

        logging::log_startup(
            ProcessId::current(),
            &format!("orchestrator with {} domains", self.config.domains.len()),
        );
        Ok(())
    }

    /// Register an externally created channel for a domain
    pub async fn register_channel(&mut self, domain: Domain, handle: ChannelHandle) {
        self.communicator.register_channel(domain, handle).await;
    }

    /// Run a worker pool for a domain in-process and connect it
    pub async fn attach_worker(&mut self, domain: Domain, pool: Arc<dyn WorkerPool>) {
        let (orchestrator_side, worker_side) = InProcessTransport::pair(domain);
        self.workers
            .push(WorkerRunner::new(domain, pool, worker_side).spawn());
        self.communicator.register_channel(domain, orchestrator_side).await;
        process_debug!(ProcessId::current(), "👷 Worker attached for {}", domain);
    }

    /// Plan and dispatch a task
    ///
    /// Malformed tasks and submissions outside `Active`/`Coordinating` are
    /// errors; everything else, including failed decisions and MECE
    /// violations, is reported in the returned report.
    pub async fn submit(&mut self, task: Task) -> OrchestratorResult<SubmissionReport> {
        self.check_task(&task)?;
        if !self.state_machine.process_event(OrchestratorEvent::TaskReceived).await {
            return Err(self.not_accepting().await);
        }
        process_info!(ProcessId::current(), "📋 Task {} received", task.id);

        let pattern_matches = self.search_patterns(&task).await;
        let complexity = self.sharding.analyze_complexity(&task);
        let (partitions, depends_on, sharded) = self.plan(&task);

        let full_resources: Vec<String> = task
            .files
            .iter()
            .cloned()
            .chain(task.dependencies.iter().map(|d| format!("{DEPENDENCY_PREFIX}{d}")))
            .collect();
        let validation = self.validator.validate(&partitions, &full_resources);
        let (partitions, corrected_validation) = if !validation.valid && self.config.partition.auto_correct {
            let corrected = self.validator.correct(&partitions, &validation);
            let revalidated = self.validator.validate(&corrected, &full_resources);
            (corrected, Some(revalidated))
        } else {
            (partitions, None)
        };

        let mut decisions = Vec::with_capacity(partitions.len());
        let mut assignments = Vec::with_capacity(partitions.len());
        for partition in &partitions {
            let deps = depends_on.get(&partition.task.id).cloned().unwrap_or_default();
            let decision = self.decide(partition);
            if let Some(domain) = decision.selected_domain.filter(|_| decision.success) {
                let assignment = self
                    .dispatch(&task.id, partition.task.clone(), domain, deps, &decision)
                    .await?;
                assignments.push(assignment);
            }
            decisions.push(decision);
        }

        let balance = self.validator.analyze_balance(&partitions);
        self.check_coordination_complete().await;

        Ok(SubmissionReport {
            task_id: task.id,
            complexity,
            sharded,
            pattern_matches,
            validation,
            corrected_validation,
            decisions,
            assignments,
            balance,
        })
    }

    fn check_task(&self, task: &Task) -> OrchestratorResult<()> {
        if task.id.trim().is_empty() {
            return Err(OrchestratorError::invalid_task(&task.id, "task id must not be empty"));
        }
        let busy = self
            .assignments
            .values()
            .any(|a| a.original_task_id == task.id || a.assignment_id == task.id);
        if busy {
            return Err(OrchestratorError::invalid_task(&task.id, "task is already in flight"));
        }
        Ok(())
    }

    async fn not_accepting(&self) -> OrchestratorError {
        OrchestratorError::NotAccepting {
            state: self.state_machine.current_state().await.to_string(),
        }
    }

    async fn search_patterns(&self, task: &Task) -> usize {
        let Some(store) = &self.pattern_store else {
            return 0;
        };
        match store
            .search(&task.description, PATTERN_SEARCH_LIMIT, PATTERN_MIN_SIMILARITY)
            .await
        {
            Ok(matches) => {
                process_debug!(ProcessId::current(), "🧠 {} stored patterns match {}", matches.len(), task.id);
                matches.len()
            }
            Err(e) => {
                process_warn!(ProcessId::current(), "⚠️ Pattern search failed for {}: {}", task.id, e);
                0
            }
        }
    }

    /// Partitions, shard dependencies by partition id, and whether the task was split
    fn plan(&self, task: &Task) -> (Vec<Partition>, HashMap<String, Vec<String>>, bool) {
        if self.sharding.should_shard(task) {
            match self.sharding.shard(task) {
                Ok(shards) => {
                    let depends_on = shards
                        .iter()
                        .map(|s| (s.shard_id.clone(), s.depends_on_shard_ids.clone()))
                        .collect();
                    let partitions = shards
                        .into_iter()
                        .map(|s| Partition::new(s.assigned_domain, s.subtask))
                        .collect();
                    return (partitions, depends_on, true);
                }
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ {}; dispatching unsplit", e);
                }
            }
        }

        let routed = route_task(task);
        let domain = if self.config.domains.contains(&routed) {
            routed
        } else {
            self.config.domains.first().copied().unwrap_or(routed)
        };
        (vec![Partition::new(domain, task.clone())], HashMap::new(), false)
    }

    fn decide(&mut self, partition: &Partition) -> DecisionResult {
        let mut candidates = vec![partition.domain];
        candidates.extend(self.config.domains.iter().copied().filter(|d| *d != partition.domain));

        let mut context = DecisionContext::new(partition.task.clone(), candidates).with_load(self.current_load());
        for domain in &self.config.domains {
            let perf = self.performance.domain(*domain);
            context = context.with_metrics(
                *domain,
                DomainMetrics {
                    active_tasks: self.in_flight_for(*domain),
                    success_rate: perf.success_rate,
                    avg_completion_ms: perf.avg_completion_ms,
                },
            );
        }
        self.decisions.decide(&context)
    }

    async fn dispatch(
        &mut self,
        original_task_id: &str,
        task: Task,
        domain: Domain,
        depends_on: Vec<String>,
        decision: &DecisionResult,
    ) -> OrchestratorResult<Assignment> {
        let assignment_id = task.id.clone();
        let description = task.description.clone();
        let priority = task.priority;
        let payload = serde_json::to_value(AssignmentPayload {
            assignment_id: assignment_id.clone(),
            task,
            depends_on: depends_on.clone(),
        })?;

        let message = self
            .communicator
            .message(domain, MessageType::TaskAssignment, payload, priority);
        let message_id = message.id.clone();

        let assignment = Assignment {
            assignment_id: assignment_id.clone(),
            original_task_id: original_task_id.to_string(),
            description,
            domain,
            message_id: message_id.clone(),
            status: AssignmentStatus::Queued,
            depends_on,
            algorithm: decision.algorithm_used,
            confidence: decision.confidence,
            assigned_at: Utc::now(),
        };
        self.message_to_assignment.insert(message_id, assignment_id.clone());
        self.assignments.insert(assignment_id.clone(), assignment);

        let delivered = self
            .communicator
            .send_message(domain, message, self.config.communication.default_max_retries)
            .await;
        if delivered {
            self.mark_dispatched(&assignment_id);
        }
        process_debug!(
            ProcessId::current(),
            "📤 {} -> {} ({})",
            assignment_id,
            domain,
            if delivered { "sent" } else { "queued" }
        );

        self.assignments
            .get(&assignment_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::invalid_task(&assignment_id, "assignment vanished during dispatch"))
    }

    fn mark_dispatched(&mut self, assignment_id: &str) {
        if let Some(assignment) = self.assignments.get_mut(assignment_id) {
            if assignment.status == AssignmentStatus::Queued {
                assignment.status = AssignmentStatus::Dispatched;
            }
        }
    }

    fn in_flight_for(&self, domain: Domain) -> u32 {
        self.assignments.values().filter(|a| a.domain == domain).count() as u32
    }

    fn in_flight(&self) -> usize {
        self.assignments.len()
    }

    /// In-flight work relative to total capacity
    fn current_load(&self) -> f64 {
        let capacity = self.config.domains.len() as f64 * self.config.decision.max_concurrent_per_domain as f64;
        if capacity == 0.0 {
            return 1.0;
        }
        (self.in_flight() as f64 / capacity).min(1.0)
    }

    async fn check_coordination_complete(&mut self) {
        if self.in_flight() == 0
            && self.state_machine.current_state().await == OrchestratorState::Coordinating
        {
            self.state_machine
                .process_event(OrchestratorEvent::CoordinationComplete)
                .await;
        }
    }

    /// Apply a message forwarded by the communication layer
    pub async fn handle_inbound(&mut self, domain: Domain, message: Message) {
        match message.message_type {
            MessageType::TaskResult => match message.payload_as::<TaskResult>() {
                Ok(result) => {
                    let duration = Duration::from_millis(result.metadata.duration_ms);
                    self.settle(&result.task_id, true, Some(duration)).await;
                }
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Bad result from {}: {}", domain, e);
                }
            },
            MessageType::TaskFailure => match message.payload_as::<FailurePayload>() {
                Ok(failure) => {
                    process_warn!(
                        ProcessId::current(),
                        "⚠️ {} failed on {}: {}",
                        failure.assignment_id,
                        domain,
                        failure.reason
                    );
                    self.settle(&failure.assignment_id, false, None).await;
                }
                Err(e) => {
                    process_warn!(ProcessId::current(), "⚠️ Bad failure report from {}: {}", domain, e);
                }
            },
            other => {
                process_debug!(ProcessId::current(), "📨 Ignoring {:?} from {}", other, domain);
            }
        }
    }

    /// Apply the outcome of an assignment that waited in the retry queue
    pub async fn handle_delivery(&mut self, report: DeliveryReport) {
        match report {
            DeliveryReport::Delivered { message_id, .. } => {
                if let Some(assignment_id) = self.message_to_assignment.get(&message_id).cloned() {
                    self.mark_dispatched(&assignment_id);
                }
            }
            DeliveryReport::Failed { domain, message_id, attempts } => {
                if let Some(assignment_id) = self.message_to_assignment.get(&message_id).cloned() {
                    process_error!(
                        ProcessId::current(),
                        "❌ Assignment {} undeliverable to {} after {} attempts",
                        assignment_id,
                        domain,
                        attempts
                    );
                    self.settle(&assignment_id, false, None).await;
                }
            }
        }
    }

    async fn settle(&mut self, assignment_id: &str, success: bool, duration: Option<Duration>) {
        let Some(mut assignment) = self.assignments.remove(assignment_id) else {
            process_warn!(ProcessId::current(), "⚠️ Report for unknown or settled assignment {}", assignment_id);
            return;
        };
        self.message_to_assignment.remove(&assignment.message_id);

        assignment.status = if success {
            AssignmentStatus::Completed
        } else {
            AssignmentStatus::Failed
        };
        let elapsed = duration.unwrap_or_else(|| (Utc::now() - assignment.assigned_at).to_std().unwrap_or_default());

        self.performance.record_completion(assignment.domain, success, elapsed);
        if success {
            logging::log_success(
                ProcessId::current(),
                &format!("{} completed by {}", assignment.assignment_id, assignment.domain),
            );
            self.store_pattern(&assignment, elapsed).await;
        }
        self.record_settled(assignment);
        self.check_coordination_complete().await;
    }

    fn record_settled(&mut self, assignment: Assignment) {
        if self.settled.len() >= self.config.assignment_history_limit {
            self.settled.pop_front();
        }
        self.settled.push_back(assignment);
    }

    async fn store_pattern(&self, assignment: &Assignment, elapsed: Duration) {
        let Some(store) = &self.pattern_store else {
            return;
        };
        let content = format!(
            "{} handled by {} in {} ms",
            assignment.description,
            assignment.domain,
            elapsed.as_millis()
        );
        let tags = HashMap::from([
            ("domain".to_string(), assignment.domain.to_string()),
            ("task_id".to_string(), assignment.assignment_id.clone()),
            ("original_task_id".to_string(), assignment.original_task_id.clone()),
        ]);
        if let Err(e) = store.store(&content, tags).await {
            process_warn!(ProcessId::current(), "⚠️ Pattern store failed for {}: {}", assignment.assignment_id, e);
        }
    }

    /// Handle everything already waiting without blocking; returns the count
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((domain, message)) = self.inbound_rx.try_recv() {
            self.handle_inbound(domain, message).await;
            handled += 1;
        }
        while let Ok(report) = self.deliveries_rx.try_recv() {
            self.handle_delivery(report).await;
            handled += 1;
        }
        handled
    }

    /// Main event loop until a shutdown signal arrives
    pub async fn run(&mut self) -> OrchestratorResult<()> {
        loop {
            tokio::select! {
                Some((domain, message)) = self.inbound_rx.recv() => {
                    self.handle_inbound(domain, message).await;
                },

                Some(report) = self.deliveries_rx.recv() => {
                    self.handle_delivery(report).await;
                },

                Some(_) = self.shutdown_rx.recv() => {
                    process_debug!(ProcessId::current(), "🛑 Shutting down orchestrator...");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// `ShuttingDown` -> channels closed -> `Shutdown`
    pub async fn shutdown(&mut self) -> OrchestratorResult<()> {
        if self.state_machine.current_state().await == OrchestratorState::Shutdown {
            return Ok(());
        }
        if !self.state_machine.process_event(OrchestratorEvent::ShutdownInitiated).await {
            return Err(self.not_accepting().await);
        }
        self.state_machine.cancel_recovery().await;
        self.communicator.shutdown().await;

        for worker in self.workers.drain(..) {
            if tokio::time::timeout(WORKER_STOP_TIMEOUT, worker).await.is_err() {
                process_warn!(ProcessId::current(), "⚠️ Worker did not stop in time");
            }
        }

        self.state_machine
            .process_event(OrchestratorEvent::ShutdownComplete)
            .await;
        logging::log_shutdown(ProcessId::current(), "orchestrator stopped");
        Ok(())
    }

    /// In-flight assignment, or the most recent settled one with this id
    pub fn assignment(&self, assignment_id: &str) -> Option<&Assignment> {
        self.assignments
            .get(assignment_id)
            .or_else(|| self.settled.iter().rev().find(|a| a.assignment_id == assignment_id))
    }

    /// Settled assignments still retained, oldest first
    pub fn assignment_history(&self) -> &VecDeque<Assignment> {
        &self.settled
    }

    /// Message ids still mapped to an in-flight assignment
    pub fn tracked_messages(&self) -> usize {
        self.message_to_assignment.len()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        let mut active_assignments: Vec<Assignment> = self.assignments.values().cloned().collect();
        active_assignments.sort_by(|a, b| a.assignment_id.cmp(&b.assignment_id));

        OrchestratorStatus {
            state: self.state_machine.current_state().await,
            state_metrics: self.state_machine.metrics().await,
            decisions: self.decisions.metrics(),
            communication: self.communicator.metrics().await,
            partitions: self.validator.metrics().clone(),
            performance: self.performance.snapshot(),
            active_assignments,
            queue_depth: self.communicator.queue_depth().await,
        }
    }
}
