//! Domain model: identifiers, the payment initiation ledger, PSP-facing
//! shapes, and the ports the engine drives.

pub mod account;
pub mod amount;
pub mod event;
pub mod ids;
pub mod page;
pub mod payment;
pub mod payment_initiation;
pub mod plugin;
pub mod ports;
pub mod reversal;
pub mod schedule;
pub mod task;
pub mod workflow;
