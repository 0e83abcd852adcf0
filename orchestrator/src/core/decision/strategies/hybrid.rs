//! Capability-first selection with a weighted fallback
//!
//! Used for very complex tasks: a strong capability match is trusted outright,
//! anything weaker is re-scored across every factor.

use super::super::traits::DecisionStrategy;
use super::super::types::*;
use super::{CapabilityMatchingStrategy, WeightedScoringStrategy};

/// Capability confidence needed to skip the weighted pass
const CAPABILITY_ACCEPT_THRESHOLD: f64 = 0.7;

pub struct HybridStrategy {
    capability: CapabilityMatchingStrategy,
    weighted: WeightedScoringStrategy,
}

impl HybridStrategy {
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            capability: CapabilityMatchingStrategy::new(),
            weighted: WeightedScoringStrategy::new(max_concurrent),
        }
    }
}

impl DecisionStrategy for HybridStrategy {
    fn algorithm(&self) -> DecisionAlgorithm {
        DecisionAlgorithm::Hybrid
    }

    fn decide(&self, context: &DecisionContext) -> DecisionResult {
        let by_capability = self.capability.decide(context);
        if by_capability.success && by_capability.confidence > CAPABILITY_ACCEPT_THRESHOLD {
            return DecisionResult {
                algorithm_used: self.algorithm(),
                reasoning: format!("Capability match accepted: {}", by_capability.reasoning),
                ..by_capability
            };
        }

        let weighted = self.weighted.decide(context);
        if weighted.success {
            return DecisionResult {
                algorithm_used: self.algorithm(),
                reasoning: format!(
                    "Capability confidence {:.2} too low, used weighted scoring: {}",
                    by_capability.confidence, weighted.reasoning
                ),
                ..weighted
            };
        }

        DecisionResult::failure(
            self.algorithm(),
            format!(
                "Neither capability matching nor weighted scoring found a domain ({}; {})",
                by_capability.reasoning, weighted.reasoning
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Domain, Task};

    #[test]
    fn test_strong_capability_match_is_used() {
        let ctx = DecisionContext::new(
            Task::new("t", "x", Domain::Development).with_capabilities(["security", "audit"]),
            vec![Domain::Development, Domain::Security],
        );
        let result = HybridStrategy::new(5).decide(&ctx);
        assert_eq!(result.selected_domain, Some(Domain::Security));
        assert_eq!(result.algorithm_used, DecisionAlgorithm::Hybrid);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_weak_match_falls_back_to_weighted() {
        let ctx = DecisionContext::new(
            Task::new("t", "x", Domain::Development),
            vec![Domain::Research, Domain::Quality],
        );
        let result = HybridStrategy::new(5).decide(&ctx);
        assert!(result.success);
        assert_eq!(result.selected_domain, Some(Domain::Research));
        assert!(result.reasoning.starts_with("Capability confidence 0.00"));
    }
}
