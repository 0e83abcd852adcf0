//! Service implementations
//!
//! Channel plumbing between the orchestrator and worker pools: the
//! communication layer, an in-process transport, and the worker-side runner.

pub mod communicator;
pub mod transport;
pub mod worker_runner;

#[cfg(test)]
mod tests;

pub use communicator::{CommunicatorReceivers, DeliveryReport, QueuedMessage, WorkerChannel, WorkerCommunicator};
pub use transport::InProcessTransport;
pub use worker_runner::WorkerRunner;
