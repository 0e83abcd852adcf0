//! Decision engine data types
//!
//! Inputs and outputs shared by every selection algorithm, kept apart from
//! the strategy trait and its implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Domain, Task};
use std::collections::HashMap;
use std::fmt;

use crate::core::performance::DEFAULT_SUCCESS_RATE;

/// Selection algorithm; the engine dispatches on this at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAlgorithm {
    WeightedScoring,
    LoadBalancing,
    CapabilityMatching,
    Hybrid,
}

impl fmt::Display for DecisionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionAlgorithm::WeightedScoring => write!(f, "weighted_scoring"),
            DecisionAlgorithm::LoadBalancing => write!(f, "load_balancing"),
            DecisionAlgorithm::CapabilityMatching => write!(f, "capability_matching"),
            DecisionAlgorithm::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Live telemetry for one candidate domain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainMetrics {
    /// Tasks currently in flight
    pub active_tasks: u32,
    /// Historical success rate (0.0-1.0)
    pub success_rate: f64,
    pub avg_completion_ms: f64,
}

impl Default for DomainMetrics {
    fn default() -> Self {
        Self {
            active_tasks: 0,
            success_rate: DEFAULT_SUCCESS_RATE,
            avg_completion_ms: 0.0,
        }
    }
}

/// Everything a strategy needs to pick a domain
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub task: Task,
    /// Candidates in preference order; earlier wins ties
    pub candidate_domains: Vec<Domain>,
    /// Normalised system load (0.0-1.0)
    pub current_load: f64,
    pub domain_metrics: HashMap<Domain, DomainMetrics>,
}

impl DecisionContext {
    pub fn new(task: Task, candidate_domains: Vec<Domain>) -> Self {
        Self {
            task,
            candidate_domains,
            current_load: 0.0,
            domain_metrics: HashMap::new(),
        }
    }

    pub fn with_load(mut self, current_load: f64) -> Self {
        self.current_load = current_load;
        self
    }

    pub fn with_metrics(mut self, domain: Domain, metrics: DomainMetrics) -> Self {
        self.domain_metrics.insert(domain, metrics);
        self
    }

    pub fn metrics_for(&self, domain: Domain) -> DomainMetrics {
        self.domain_metrics.get(&domain).copied().unwrap_or_default()
    }
}

/// A ranked runner-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub domain: Domain,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Outcome of worker selection; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub success: bool,
    pub selected_domain: Option<Domain>,
    /// 0.0-1.0
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<Alternative>,
    pub algorithm_used: DecisionAlgorithm,
    pub timestamp: DateTime<Utc>,
}

impl DecisionResult {
    pub fn selected(
        algorithm: DecisionAlgorithm,
        domain: Domain,
        confidence: f64,
        reasoning: String,
        alternatives: Vec<Alternative>,
    ) -> Self {
        Self {
            success: true,
            selected_domain: Some(domain),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            alternatives,
            algorithm_used: algorithm,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(algorithm: DecisionAlgorithm, reasoning: impl Into<String>) -> Self {
        Self {
            success: false,
            selected_domain: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            alternatives: Vec::new(),
            algorithm_used: algorithm,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate decision statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionMetrics {
    pub total_decisions: u64,
    pub successful: u64,
    pub failed: u64,
    pub by_algorithm: HashMap<DecisionAlgorithm, u64>,
    /// Mean confidence of successful decisions still in history
    pub average_confidence: f64,
    pub history_len: usize,
}

/// Score candidates descending, keeping input order among equals
pub(crate) fn rank(mut alternatives: Vec<Alternative>) -> Vec<Alternative> {
    alternatives.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    alternatives
}
