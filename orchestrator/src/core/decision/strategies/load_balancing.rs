//! Least-loaded selection for periods of high system load

use super::super::traits::DecisionStrategy;
use super::super::types::*;

const LOAD_BALANCING_CONFIDENCE: f64 = 0.8;

pub struct LoadBalancingStrategy {
    max_concurrent: u32,
}

impl LoadBalancingStrategy {
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }
}

impl DecisionStrategy for LoadBalancingStrategy {
    fn algorithm(&self) -> DecisionAlgorithm {
        DecisionAlgorithm::LoadBalancing
    }

    fn decide(&self, context: &DecisionContext) -> DecisionResult {
        let eligible: Vec<(shared::Domain, u32)> = context
            .candidate_domains
            .iter()
            .map(|d| (*d, context.metrics_for(*d).active_tasks))
            .filter(|(_, active)| *active < self.max_concurrent)
            .collect();

        let Some(&(domain, active)) = eligible.iter().min_by_key(|(_, active)| *active) else {
            return DecisionResult::failure(
                self.algorithm(),
                format!(
                    "All {} candidate domains are at the concurrency cap of {}",
                    context.candidate_domains.len(),
                    self.max_concurrent
                ),
            );
        };

        let alternatives = rank(
            eligible
                .iter()
                .filter(|(d, _)| *d != domain)
                .map(|(d, a)| Alternative {
                    domain: *d,
                    score: 1.0 - *a as f64 / self.max_concurrent as f64,
                    reasons: vec![format!("{a} tasks in flight")],
                })
                .collect(),
        );

        DecisionResult::selected(
            self.algorithm(),
            domain,
            LOAD_BALANCING_CONFIDENCE,
            format!("{domain} has the fewest tasks in flight ({active}/{})", self.max_concurrent),
            alternatives,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Domain, Task};

    fn busy(active_tasks: u32) -> DomainMetrics {
        DomainMetrics {
            active_tasks,
            ..DomainMetrics::default()
        }
    }

    #[test]
    fn test_picks_least_loaded() {
        let ctx = DecisionContext::new(
            Task::new("t", "x", Domain::Development),
            vec![Domain::Development, Domain::Quality, Domain::Security],
        )
        .with_metrics(Domain::Development, busy(3))
        .with_metrics(Domain::Quality, busy(1))
        .with_metrics(Domain::Security, busy(2));

        let result = LoadBalancingStrategy::new(5).decide(&ctx);
        assert_eq!(result.selected_domain, Some(Domain::Quality));
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.alternatives[0].domain, Domain::Security);
    }

    #[test]
    fn test_capped_domains_are_excluded() {
        let ctx = DecisionContext::new(
            Task::new("t", "x", Domain::Development),
            vec![Domain::Development, Domain::Quality],
        )
        .with_metrics(Domain::Development, busy(5))
        .with_metrics(Domain::Quality, busy(5));

        let result = LoadBalancingStrategy::new(5).decide(&ctx);
        assert!(!result.success);
        assert!(result.selected_domain.is_none());
        assert!(result.alternatives.is_empty());
    }
}
