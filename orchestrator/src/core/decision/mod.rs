//! Decision engine: picks the domain that should execute a task
//!
//! The algorithm is chosen per task from complexity, declared capabilities and
//! system load, then dispatched through a fixed table. Every decision is kept
//! in a bounded history and announced on the event bus.

pub mod strategies;
pub mod traits;
pub mod types;

pub use traits::DecisionStrategy;
pub use types::*;

use std::collections::{HashMap, VecDeque};

use shared::{process_debug, process_warn, ProcessId};
use strategies::{CapabilityMatchingStrategy, HybridStrategy, LoadBalancingStrategy, WeightedScoringStrategy};

use super::complexity::analyze_complexity;
use crate::config::DecisionConfig;
use crate::events::{EventBus, Notification};

pub struct DecisionEngine {
    config: DecisionConfig,
    weighted: WeightedScoringStrategy,
    load_balancing: LoadBalancingStrategy,
    capability: CapabilityMatchingStrategy,
    hybrid: HybridStrategy,
    history: VecDeque<DecisionResult>,
    totals: DecisionMetrics,
    events: EventBus,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, events: EventBus) -> Self {
        let cap = config.max_concurrent_per_domain;
        Self {
            weighted: WeightedScoringStrategy::new(cap),
            load_balancing: LoadBalancingStrategy::new(cap),
            capability: CapabilityMatchingStrategy::new(),
            hybrid: HybridStrategy::new(cap),
            history: VecDeque::new(),
            totals: DecisionMetrics::default(),
            config,
            events,
        }
    }

    /// Algorithm for this context, in precedence order:
    /// complexity, then declared capabilities, then load
    pub fn select_algorithm(&self, context: &DecisionContext) -> DecisionAlgorithm {
        if analyze_complexity(&context.task) > self.config.high_complexity_threshold {
            DecisionAlgorithm::Hybrid
        } else if !context.task.required_capabilities.is_empty() {
            DecisionAlgorithm::CapabilityMatching
        } else if context.current_load > self.config.high_load_threshold {
            DecisionAlgorithm::LoadBalancing
        } else {
            DecisionAlgorithm::WeightedScoring
        }
    }

    fn strategy(&self, algorithm: DecisionAlgorithm) -> &dyn DecisionStrategy {
        match algorithm {
            DecisionAlgorithm::WeightedScoring => &self.weighted,
            DecisionAlgorithm::LoadBalancing => &self.load_balancing,
            DecisionAlgorithm::CapabilityMatching => &self.capability,
            DecisionAlgorithm::Hybrid => &self.hybrid,
        }
    }

    pub fn decide(&mut self, context: &DecisionContext) -> DecisionResult {
        let algorithm = self.select_algorithm(context);

        let result = if context.candidate_domains.is_empty() {
            DecisionResult::failure(algorithm, "No candidate domains available")
        } else {
            self.strategy(algorithm).decide(context)
        };

        if result.success {
            process_debug!(
                ProcessId::current(),
                "🎯 Task {} -> {:?} via {} (confidence {:.2})",
                context.task.id,
                result.selected_domain,
                result.algorithm_used,
                result.confidence
            );
        } else {
            process_warn!(
                ProcessId::current(),
                "⚠️ No domain selected for task {}: {}",
                context.task.id,
                result.reasoning
            );
        }

        self.record(&context.task.id, &result);
        result
    }

    fn record(&mut self, task_id: &str, result: &DecisionResult) {
        self.totals.total_decisions += 1;
        if result.success {
            self.totals.successful += 1;
        } else {
            self.totals.failed += 1;
        }
        *self.totals.by_algorithm.entry(result.algorithm_used).or_insert(0) += 1;

        self.history.push_back(result.clone());
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }

        self.events.emit(Notification::DecisionMade {
            task_id: task_id.to_string(),
            selected: result.selected_domain,
            confidence: result.confidence,
            algorithm: result.algorithm_used,
        });
    }

    pub fn history(&self) -> &VecDeque<DecisionResult> {
        &self.history
    }

    pub fn metrics(&self) -> DecisionMetrics {
        let confidences: Vec<f64> = self
            .history
            .iter()
            .filter(|r| r.success)
            .map(|r| r.confidence)
            .collect();
        let average_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        DecisionMetrics {
            by_algorithm: self.totals.by_algorithm.clone(),
            average_confidence,
            history_len: self.history.len(),
            ..self.totals.clone()
        }
    }

    /// Algorithm usage counts over the lifetime of the engine
    pub fn algorithm_usage(&self) -> &HashMap<DecisionAlgorithm, u64> {
        &self.totals.by_algorithm
    }
}
