//! Weighted multi-factor scoring
//!
//! Blends capability fit, historical success, spare capacity and speed into a
//! single score per candidate. The default algorithm for ordinary tasks.

use super::super::traits::DecisionStrategy;
use super::super::types::*;
use shared::{Domain, Task};

const CAPABILITY_WEIGHT: f64 = 0.4;
const SUCCESS_WEIGHT: f64 = 0.3;
const LOAD_WEIGHT: f64 = 0.2;
const SPEED_WEIGHT: f64 = 0.1;

/// Per-factor breakdown for one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub capability: f64,
    pub success: f64,
    pub load: f64,
    pub speed: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        CAPABILITY_WEIGHT * self.capability
            + SUCCESS_WEIGHT * self.success
            + LOAD_WEIGHT * (1.0 - self.load)
            + SPEED_WEIGHT * (1.0 - self.speed)
    }

    fn reasons(&self) -> Vec<String> {
        vec![
            format!("capability match {:.2}", self.capability),
            format!("success rate {:.2}", self.success),
            format!("load {:.2}", self.load),
            format!("relative completion time {:.2}", self.speed),
        ]
    }
}

pub struct WeightedScoringStrategy {
    max_concurrent: u32,
}

impl WeightedScoringStrategy {
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Score every candidate in preference order
    pub fn score_all(&self, context: &DecisionContext) -> Vec<(Domain, ScoreBreakdown)> {
        let slowest = context
            .candidate_domains
            .iter()
            .map(|d| context.metrics_for(*d).avg_completion_ms)
            .fold(0.0_f64, f64::max);

        context
            .candidate_domains
            .iter()
            .map(|domain| {
                let metrics = context.metrics_for(*domain);
                let breakdown = ScoreBreakdown {
                    capability: capability_ratio(&context.task, *domain),
                    success: metrics.success_rate.clamp(0.0, 1.0),
                    load: (metrics.active_tasks as f64 / self.max_concurrent as f64).min(1.0),
                    speed: if slowest > 0.0 {
                        metrics.avg_completion_ms / slowest
                    } else {
                        0.0
                    },
                };
                (*domain, breakdown)
            })
            .collect()
    }
}

impl DecisionStrategy for WeightedScoringStrategy {
    fn algorithm(&self) -> DecisionAlgorithm {
        DecisionAlgorithm::WeightedScoring
    }

    fn decide(&self, context: &DecisionContext) -> DecisionResult {
        let scored = self.score_all(context);

        let mut best: Option<(usize, f64)> = None;
        for (i, (_, breakdown)) in scored.iter().enumerate() {
            let score = breakdown.total();
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((winner, score)) = best.filter(|(_, s)| *s > 0.0) else {
            return DecisionResult::failure(self.algorithm(), "No candidate scored above zero");
        };

        let (domain, breakdown) = scored[winner];
        let alternatives = rank(
            scored
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != winner)
                .map(|(_, (d, b))| Alternative {
                    domain: *d,
                    score: b.total(),
                    reasons: b.reasons(),
                })
                .collect(),
        );

        DecisionResult::selected(
            self.algorithm(),
            domain,
            score.min(1.0),
            format!(
                "Weighted score {:.2} for {} ({})",
                score,
                domain,
                breakdown.reasons().join(", ")
            ),
            alternatives,
        )
    }
}

/// Share of required capabilities the domain offers; 1.0 when none are required
pub fn capability_ratio(task: &Task, domain: Domain) -> f64 {
    if task.required_capabilities.is_empty() {
        return 1.0;
    }
    let matched = task
        .required_capabilities
        .iter()
        .filter(|c| domain.has_capability(c))
        .count();
    matched as f64 / task.required_capabilities.len() as f64
}
