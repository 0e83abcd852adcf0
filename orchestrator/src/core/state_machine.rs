//! Orchestrator lifecycle state machine
//!
//! Explicit (state, event) -> state table with optional guards, actions and
//! per-state enter/exit hooks. A failing hook or action forces the machine
//! into `ErrorRecovery`, which schedules its own `RecoveryComplete` after the
//! configured delay unless another error arrives first.
//!
//! Hooks run while the machine is locked and must not dispatch events back
//! into the same machine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use shared::{process_debug, process_error, process_warn, ProcessId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::StateMachineConfig;
use crate::events::{EventBus, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Initializing,
    Active,
    Coordinating,
    ErrorRecovery,
    ShuttingDown,
    /// Terminal
    Shutdown,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Initialize,
    ActivationComplete,
    TaskReceived,
    CoordinationComplete,
    Error,
    RecoveryComplete,
    ShutdownInitiated,
    ShutdownComplete,
}

/// Snapshot handed to guards, actions and hooks
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionContext {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub event: OrchestratorEvent,
    pub timestamp: DateTime<Utc>,
}

pub type HookResult = Result<(), String>;
pub type Guard = Arc<dyn Fn(&TransitionContext) -> bool + Send + Sync>;
pub type Action = Arc<dyn Fn(TransitionContext) -> BoxFuture<'static, HookResult> + Send + Sync>;
pub type StateHook = Action;

#[derive(Clone)]
struct Transition {
    to: OrchestratorState,
    guard: Option<Guard>,
    action: Option<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub event: OrchestratorEvent,
    pub timestamp: DateTime<Utc>,
    pub duration_in_prior_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMetrics {
    pub current: OrchestratorState,
    pub total_transitions: u64,
    pub time_in_state_ms: BTreeMap<OrchestratorState, u64>,
    /// Keyed by `from->to`
    pub transition_counts: BTreeMap<String, u64>,
}

struct Inner {
    current: OrchestratorState,
    entered_at: DateTime<Utc>,
    transitions: HashMap<(OrchestratorState, OrchestratorEvent), Transition>,
    on_enter: HashMap<OrchestratorState, Vec<StateHook>>,
    on_exit: HashMap<OrchestratorState, Vec<StateHook>>,
    history: VecDeque<TransitionRecord>,
    total_transitions: u64,
    recovery_timer: Option<JoinHandle<()>>,
    recovery_generation: u64,
}

/// Cloneable handle; clones share one machine
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<Mutex<Inner>>,
    config: StateMachineConfig,
    events: EventBus,
}

fn default_transitions() -> Vec<(OrchestratorState, OrchestratorEvent, OrchestratorState)> {
    use OrchestratorEvent as E;
    use OrchestratorState as S;

    let mut table = vec![
        (S::Idle, E::Initialize, S::Initializing),
        (S::Initializing, E::ActivationComplete, S::Active),
        (S::Active, E::TaskReceived, S::Coordinating),
        (S::Coordinating, E::TaskReceived, S::Coordinating),
        (S::Coordinating, E::CoordinationComplete, S::Active),
        (S::Initializing, E::Error, S::ErrorRecovery),
        (S::Active, E::Error, S::ErrorRecovery),
        (S::Coordinating, E::Error, S::ErrorRecovery),
        (S::ErrorRecovery, E::Error, S::ErrorRecovery),
        (S::ErrorRecovery, E::RecoveryComplete, S::Active),
        (S::ShuttingDown, E::ShutdownComplete, S::Shutdown),
    ];
    for from in [S::Idle, S::Initializing, S::Active, S::Coordinating, S::ErrorRecovery] {
        table.push((from, E::ShutdownInitiated, S::ShuttingDown));
    }
    table
}

impl StateMachine {
    pub fn new(config: StateMachineConfig, events: EventBus) -> Self {
        let transitions = default_transitions()
            .into_iter()
            .map(|(from, event, to)| {
                (
                    (from, event),
                    Transition {
                        to,
                        guard: None,
                        action: None,
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: OrchestratorState::Idle,
                entered_at: Utc::now(),
                transitions,
                on_enter: HashMap::new(),
                on_exit: HashMap::new(),
                history: VecDeque::new(),
                total_transitions: 0,
                recovery_timer: None,
                recovery_generation: 0,
            })),
            config,
            events,
        }
    }

    pub async fn current_state(&self) -> OrchestratorState {
        self.inner.lock().await.current
    }

    pub async fn can_handle(&self, event: OrchestratorEvent) -> bool {
        let inner = self.inner.lock().await;
        inner.transitions.contains_key(&(inner.current, event))
    }

    /// Register or replace a transition
    pub async fn add_transition(&self, from: OrchestratorState, event: OrchestratorEvent, to: OrchestratorState) {
        self.inner.lock().await.transitions.insert(
            (from, event),
            Transition {
                to,
                guard: None,
                action: None,
            },
        );
    }

    /// Returns false when no such transition exists
    pub async fn set_guard(&self, from: OrchestratorState, event: OrchestratorEvent, guard: Guard) -> bool {
        match self.inner.lock().await.transitions.get_mut(&(from, event)) {
            Some(transition) => {
                transition.guard = Some(guard);
                true
            }
            None => false,
        }
    }

    /// Returns false when no such transition exists
    pub async fn set_action(&self, from: OrchestratorState, event: OrchestratorEvent, action: Action) -> bool {
        match self.inner.lock().await.transitions.get_mut(&(from, event)) {
            Some(transition) => {
                transition.action = Some(action);
                true
            }
            None => false,
        }
    }

    pub async fn on_enter(&self, state: OrchestratorState, hook: StateHook) {
        self.inner.lock().await.on_enter.entry(state).or_default().push(hook);
    }

    pub async fn on_exit(&self, state: OrchestratorState, hook: StateHook) {
        self.inner.lock().await.on_exit.entry(state).or_default().push(hook);
    }

    /// Apply an event; false when the pair is unregistered, the guard
    /// rejects it, or a hook failed and recovery took over
    pub async fn process_event(&self, event: OrchestratorEvent) -> bool {
        let mut inner = self.inner.lock().await;
        let from = inner.current;

        let Some(transition) = inner.transitions.get(&(from, event)).cloned() else {
            process_warn!(
                ProcessId::current(),
                "⚠️ Invalid transition: {:?} has no handler for {:?}",
                from,
                event
            );
            return false;
        };

        let context = TransitionContext {
            from,
            to: transition.to,
            event,
            timestamp: Utc::now(),
        };

        if let Some(guard) = &transition.guard {
            if !guard(&context) {
                process_debug!(ProcessId::current(), "🚫 Guard rejected {:?} -> {:?}", from, transition.to);
                return false;
            }
        }

        let exit_hooks = inner.on_exit.get(&from).cloned().unwrap_or_default();
        let mut failure = run_hooks(&exit_hooks, &context).await.err();

        if failure.is_none() {
            self.apply(&mut inner, transition.to, event);

            if let Some(action) = &transition.action {
                failure = action(context.clone()).await.err();
            }
            if failure.is_none() {
                let enter_hooks = inner.on_enter.get(&transition.to).cloned().unwrap_or_default();
                failure = run_hooks(&enter_hooks, &context).await.err();
            }
        }

        match failure {
            None => {
                if transition.to == OrchestratorState::ErrorRecovery {
                    self.schedule_recovery(&mut inner);
                } else if from == OrchestratorState::ErrorRecovery {
                    inner.recovery_generation += 1;
                    inner.recovery_timer = None;
                }
                true
            }
            Some(error) => {
                process_error!(
                    ProcessId::current(),
                    "❌ Transition {:?} -> {:?} failed: {}",
                    from,
                    transition.to,
                    error
                );
                if inner.current != OrchestratorState::ErrorRecovery {
                    self.apply(&mut inner, OrchestratorState::ErrorRecovery, OrchestratorEvent::Error);
                }
                self.schedule_recovery(&mut inner);
                false
            }
        }
    }

    /// Boxed entry point for tasks spawned from inside `process_event`
    fn dispatch_boxed(&self, event: OrchestratorEvent) -> BoxFuture<'static, bool> {
        let machine = self.clone();
        Box::pin(async move { machine.process_event(event).await })
    }

    fn apply(&self, inner: &mut Inner, to: OrchestratorState, event: OrchestratorEvent) {
        let now = Utc::now();
        let from = inner.current;
        let duration_in_prior_ms = (now - inner.entered_at).num_milliseconds().max(0) as u64;

        inner.current = to;
        inner.entered_at = now;
        inner.total_transitions += 1;
        inner.history.push_back(TransitionRecord {
            from,
            to,
            event,
            timestamp: now,
            duration_in_prior_ms,
        });
        while inner.history.len() > self.config.history_limit {
            inner.history.pop_front();
        }

        process_debug!(ProcessId::current(), "🔄 {:?} --{:?}--> {:?}", from, event, to);
        self.events.emit(Notification::StateChanged { from, to, event });
    }

    /// (Re)arm the timer that leaves `ErrorRecovery`
    fn schedule_recovery(&self, inner: &mut Inner) {
        inner.recovery_generation += 1;
        let generation = inner.recovery_generation;
        let delay = self.config.recovery_delay();
        let machine = self.clone();

        if let Some(previous) = inner.recovery_timer.take() {
            // A stale timer that already woke is neutralised by the generation check
            previous.abort();
        }
        inner.recovery_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            machine.recover_if_current(generation).await;
        }));
    }

    fn recover_if_current(&self, generation: u64) -> BoxFuture<'static, bool> {
        let machine = self.clone();
        Box::pin(async move {
            {
                let inner = machine.inner.lock().await;
                if inner.recovery_generation != generation || inner.current != OrchestratorState::ErrorRecovery {
                    return false;
                }
            }
            machine.dispatch_boxed(OrchestratorEvent::RecoveryComplete).await
        })
    }

    /// Stop any pending automatic recovery
    pub async fn cancel_recovery(&self) {
        let mut inner = self.inner.lock().await;
        inner.recovery_generation += 1;
        if let Some(timer) = inner.recovery_timer.take() {
            timer.abort();
        }
    }

    pub async fn history(&self) -> Vec<TransitionRecord> {
        self.inner.lock().await.history.iter().cloned().collect()
    }

    pub async fn time_in_state(&self) -> BTreeMap<OrchestratorState, Duration> {
        let inner = self.inner.lock().await;
        let mut totals: BTreeMap<OrchestratorState, Duration> = BTreeMap::new();
        for record in &inner.history {
            *totals.entry(record.from).or_default() += Duration::from_millis(record.duration_in_prior_ms);
        }
        let current = (Utc::now() - inner.entered_at).to_std().unwrap_or_default();
        *totals.entry(inner.current).or_default() += current;
        totals
    }

    pub async fn transition_counts(&self) -> BTreeMap<(OrchestratorState, OrchestratorState), u64> {
        let inner = self.inner.lock().await;
        let mut counts = BTreeMap::new();
        for record in &inner.history {
            *counts.entry((record.from, record.to)).or_insert(0) += 1;
        }
        counts
    }

    pub async fn metrics(&self) -> StateMetrics {
        let time_in_state_ms = self
            .time_in_state()
            .await
            .into_iter()
            .map(|(state, d)| (state, d.as_millis() as u64))
            .collect();
        let transition_counts = self
            .transition_counts()
            .await
            .into_iter()
            .map(|((from, to), n)| (format!("{from}->{to}"), n))
            .collect();
        let inner = self.inner.lock().await;

        StateMetrics {
            current: inner.current,
            total_transitions: inner.total_transitions,
            time_in_state_ms,
            transition_counts,
        }
    }
}

async fn run_hooks(hooks: &[StateHook], context: &TransitionContext) -> HookResult {
    for hook in hooks {
        hook(context.clone()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn machine_with_delay(ms: u64) -> StateMachine {
        StateMachine::new(
            StateMachineConfig {
                recovery_delay_ms: ms,
                history_limit: 1_000,
            },
            EventBus::default(),
        )
    }

    async fn activate(machine: &StateMachine) {
        assert!(machine.process_event(OrchestratorEvent::Initialize).await);
        assert!(machine.process_event(OrchestratorEvent::ActivationComplete).await);
    }

    fn failing_action() -> Action {
        Arc::new(|_ctx: TransitionContext| async { Err("boom".to_string()) }.boxed())
    }

    #[tokio::test]
    async fn test_happy_path_lifecycle() {
        let machine = machine_with_delay(5_000);
        activate(&machine).await;
        assert!(machine.process_event(OrchestratorEvent::TaskReceived).await);
        assert!(machine.process_event(OrchestratorEvent::TaskReceived).await);
        assert!(machine.process_event(OrchestratorEvent::CoordinationComplete).await);
        assert!(machine.process_event(OrchestratorEvent::ShutdownInitiated).await);
        assert!(machine.process_event(OrchestratorEvent::ShutdownComplete).await);
        assert_eq!(machine.current_state().await, OrchestratorState::Shutdown);
        assert_eq!(machine.history().await.len(), 7);
    }

    #[tokio::test]
    async fn test_invalid_event_changes_nothing() {
        let machine = machine_with_delay(5_000);
        assert!(!machine.process_event(OrchestratorEvent::TaskReceived).await);
        assert_eq!(machine.current_state().await, OrchestratorState::Idle);
        assert!(machine.history().await.is_empty());

        activate(&machine).await;
        machine.process_event(OrchestratorEvent::ShutdownInitiated).await;
        machine.process_event(OrchestratorEvent::ShutdownComplete).await;
        assert!(!machine.process_event(OrchestratorEvent::Initialize).await);
        assert_eq!(machine.current_state().await, OrchestratorState::Shutdown);
    }

    #[tokio::test]
    async fn test_can_handle_follows_current_state() {
        let machine = machine_with_delay(5_000);
        assert!(machine.can_handle(OrchestratorEvent::Initialize).await);
        assert!(!machine.can_handle(OrchestratorEvent::TaskReceived).await);

        activate(&machine).await;
        assert!(machine.can_handle(OrchestratorEvent::TaskReceived).await);
        assert!(!machine.can_handle(OrchestratorEvent::Initialize).await);
    }

    #[tokio::test]
    async fn test_added_transition_is_taken() {
        let machine = machine_with_delay(5_000);
        assert!(!machine.can_handle(OrchestratorEvent::Error).await);

        machine
            .add_transition(OrchestratorState::Idle, OrchestratorEvent::Error, OrchestratorState::ErrorRecovery)
            .await;

        assert!(machine.can_handle(OrchestratorEvent::Error).await);
        assert!(machine.process_event(OrchestratorEvent::Error).await);
        assert_eq!(machine.current_state().await, OrchestratorState::ErrorRecovery);
    }

    #[tokio::test]
    async fn test_added_transition_replaces_existing() {
        let machine = machine_with_delay(5_000);
        machine
            .add_transition(OrchestratorState::Idle, OrchestratorEvent::Initialize, OrchestratorState::Active)
            .await;

        assert!(machine.process_event(OrchestratorEvent::Initialize).await);
        assert_eq!(machine.current_state().await, OrchestratorState::Active);
    }

    #[tokio::test]
    async fn test_guard_blocks_transition() {
        let machine = machine_with_delay(5_000);
        machine
            .set_guard(
                OrchestratorState::Idle,
                OrchestratorEvent::Initialize,
                Arc::new(|_ctx: &TransitionContext| false),
            )
            .await;
        assert!(!machine.process_event(OrchestratorEvent::Initialize).await);
        assert_eq!(machine.current_state().await, OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_action_sees_transition_context() {
        let machine = machine_with_delay(5_000);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        machine
            .set_action(
                OrchestratorState::Idle,
                OrchestratorEvent::Initialize,
                Arc::new(move |ctx: TransitionContext| {
                    let counter = counter.clone();
                    async move {
                        assert_eq!(ctx.from, OrchestratorState::Idle);
                        assert_eq!(ctx.to, OrchestratorState::Initializing);
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    .boxed()
                }),
            )
            .await;

        assert!(machine.process_event(OrchestratorEvent::Initialize).await);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_action_enters_recovery_then_active() {
        let machine = machine_with_delay(50);
        activate(&machine).await;
        machine
            .set_action(OrchestratorState::Active, OrchestratorEvent::TaskReceived, failing_action())
            .await;

        assert!(!machine.process_event(OrchestratorEvent::TaskReceived).await);
        assert_eq!(machine.current_state().await, OrchestratorState::ErrorRecovery);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(machine.current_state().await, OrchestratorState::Active);
    }

    #[tokio::test]
    async fn test_failing_enter_hook_enters_recovery() {
        let machine = machine_with_delay(5_000);
        machine.on_enter(OrchestratorState::Initializing, failing_action()).await;

        assert!(!machine.process_event(OrchestratorEvent::Initialize).await);
        assert_eq!(machine.current_state().await, OrchestratorState::ErrorRecovery);
        machine.cancel_recovery().await;
    }

    #[tokio::test]
    async fn test_new_error_resets_recovery_timer() {
        let machine = machine_with_delay(150);
        activate(&machine).await;
        machine.process_event(OrchestratorEvent::Error).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(machine.process_event(OrchestratorEvent::Error).await);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(machine.current_state().await, OrchestratorState::ErrorRecovery);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(machine.current_state().await, OrchestratorState::Active);
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_metrics_derive() {
        let machine = StateMachine::new(
            StateMachineConfig {
                recovery_delay_ms: 5_000,
                history_limit: 3,
            },
            EventBus::default(),
        );
        activate(&machine).await;
        for _ in 0..3 {
            machine.process_event(OrchestratorEvent::TaskReceived).await;
            machine.process_event(OrchestratorEvent::CoordinationComplete).await;
        }

        assert_eq!(machine.history().await.len(), 3);
        let metrics = machine.metrics().await;
        assert_eq!(metrics.total_transitions, 8);
        assert_eq!(metrics.current, OrchestratorState::Active);
        assert!(metrics.transition_counts.contains_key("Coordinating->Active"));
    }

    #[tokio::test]
    async fn test_state_changes_are_published() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let machine = StateMachine::new(StateMachineConfig::default(), events);
        machine.process_event(OrchestratorEvent::Initialize).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::StateChanged {
                from: OrchestratorState::Idle,
                to: OrchestratorState::Initializing,
                event: OrchestratorEvent::Initialize,
            }
        );
    }
}
