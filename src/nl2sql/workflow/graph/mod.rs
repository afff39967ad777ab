// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! The graph is an explicit state machine: `types` names the stages and
//! outcomes, `router` decides transitions and `executor` drives a run.

pub mod executor;
pub mod router;
pub mod types;

pub use executor::{Collaborators, WorkflowEngine};
pub use router::route;
pub use types::{Answer, Failure, FailureKind, Outcome, Signal, Stage, Transition};
