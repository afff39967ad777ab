// SPDX-License-Identifier: MIT

//! State management for the NL→SQL workflow
//!
//! This module provides:
//! - `Message` - a conversation turn, optionally tagged with a `MessageKind`
//! - `WorkflowState` - the record threaded through every stage of one run

mod message;
mod store;

pub use message::{last_message_of, last_user_message, Message, MessageKind, Role};
pub use store::{ExecutionResult, WorkflowState};
