//! Decision strategy trait definition

use super::types::{DecisionAlgorithm, DecisionContext, DecisionResult};

/// A single domain-selection algorithm
///
/// Implementations are pure: the same context always yields the same
/// selected domain and confidence.
pub trait DecisionStrategy: Send + Sync {
    fn algorithm(&self) -> DecisionAlgorithm;

    fn decide(&self, context: &DecisionContext) -> DecisionResult;
}
