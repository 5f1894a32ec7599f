//! Application layer: the durable workflows that drive payment initiations
//! through a PSP, and the `Engine` that runs them.
//!
//! Each workflow is a sequence of journaled activities on a
//! [`crate::durable::WorkflowContext`]. The ledger, event publisher, task
//! recorder and reversal validator are the shared building blocks.

pub mod connectors;
pub mod engine;
pub mod events;
mod initiation;
pub mod ledger;
mod polling;
mod reversal;
mod schedules;
pub mod tasks;
pub mod validator;
mod workflow;

pub use engine::Engine;
