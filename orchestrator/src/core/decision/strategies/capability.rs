//! Selection by declared capability coverage

use super::super::traits::DecisionStrategy;
use super::super::types::*;
use super::weighted::capability_ratio;

pub struct CapabilityMatchingStrategy;

impl CapabilityMatchingStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CapabilityMatchingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionStrategy for CapabilityMatchingStrategy {
    fn algorithm(&self) -> DecisionAlgorithm {
        DecisionAlgorithm::CapabilityMatching
    }

    fn decide(&self, context: &DecisionContext) -> DecisionResult {
        let required = &context.task.required_capabilities;
        if required.is_empty() {
            return DecisionResult::failure(self.algorithm(), "Task declares no required capabilities");
        }

        let scored: Vec<(shared::Domain, f64, Vec<String>)> = context
            .candidate_domains
            .iter()
            .map(|domain| {
                let matched: Vec<String> = required
                    .iter()
                    .filter(|c| domain.has_capability(c))
                    .map(|c| format!("provides {c}"))
                    .collect();
                (*domain, capability_ratio(&context.task, *domain), matched)
            })
            .collect();

        let mut best: Option<usize> = None;
        for (i, (_, ratio, _)) in scored.iter().enumerate() {
            if best.map_or(true, |b| *ratio > scored[b].1) {
                best = Some(i);
            }
        }

        let Some(winner) = best.filter(|b| scored[*b].1 > 0.0) else {
            return DecisionResult::failure(
                self.algorithm(),
                format!(
                    "No candidate provides any of: {}",
                    required.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            );
        };

        let (domain, ratio, matched) = &scored[winner];
        let alternatives = rank(
            scored
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != winner)
                .map(|(_, (d, r, reasons))| Alternative {
                    domain: *d,
                    score: *r,
                    reasons: reasons.clone(),
                })
                .collect(),
        );

        DecisionResult::selected(
            self.algorithm(),
            *domain,
            *ratio,
            format!(
                "{} matches {}/{} required capabilities ({})",
                domain,
                matched.len(),
                required.len(),
                matched.join(", ")
            ),
            alternatives,
        )
    }
}
