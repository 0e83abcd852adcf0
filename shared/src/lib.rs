//! Shared types for the task orchestration system
//!
//! Contains the data model and wire format used by both the orchestrator
//! and the worker pools it coordinates, plus common logging utilities.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{AssignmentPayload, FailurePayload, Message, MessageType};
