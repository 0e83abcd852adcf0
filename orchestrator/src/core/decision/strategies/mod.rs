//! Concrete domain-selection algorithms

pub mod capability;
pub mod hybrid;
pub mod load_balancing;
pub mod weighted;

pub use capability::CapabilityMatchingStrategy;
pub use hybrid::HybridStrategy;
pub use load_balancing::LoadBalancingStrategy;
pub use weighted::WeightedScoringStrategy;
