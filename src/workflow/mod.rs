//! Application workflow: the status state machine and its persistence.
//!
//! Every status change in the system goes through
//! [`transition_application`], which applies the table in [`status`] and
//! writes the audit trail in the caller's transaction.

pub mod status;
pub mod store;

pub use status::{ApplicationStatus, TransitionError, WorkflowEvent};
pub use store::transition_application;
