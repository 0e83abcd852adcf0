//! Message types for the orchestration system
//!
//! This module organizes channel messages by category:
//! - `wire`: the JSON envelope carried over every worker channel
//! - `reports`: typed payloads for assignments and worker reports

pub mod reports;
pub mod wire;

pub use reports::{AssignmentPayload, FailurePayload};
pub use wire::{Message, MessageType};
