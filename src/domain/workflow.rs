//! Inputs of the durable workflows the engine runs. They are serialized into
//! the journal and into scheduler triggers, so every field is plain data.

use super::ids::{ConnectorId, PaymentInitiationId, PaymentInitiationReversalId, TaskId};
use super::page::Cursor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transfer,
    Payout,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Payout => "payout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub task_id: TaskId,
    pub connector_id: ConnectorId,
    pub payment_initiation_id: PaymentInitiationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayout {
    pub task_id: TaskId,
    pub connector_id: ConnectorId,
    pub payment_initiation_id: PaymentInitiationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseTransfer {
    pub task_id: TaskId,
    pub connector_id: ConnectorId,
    pub reversal_id: PaymentInitiationReversalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversePayout {
    pub task_id: TaskId,
    pub connector_id: ConnectorId,
    pub reversal_id: PaymentInitiationReversalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTransfer {
    pub task_id: TaskId,
    pub connector_id: ConnectorId,
    pub payment_initiation_id: PaymentInitiationId,
    pub transfer_id: String,
    pub schedule_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPayout {
    pub task_id: TaskId,
    pub connector_id: ConnectorId,
    pub payment_initiation_id: PaymentInitiationId,
    pub payout_id: String,
    pub schedule_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateSchedules {
    pub connector_id: ConnectorId,
    #[serde(default)]
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum WorkflowInput {
    CreateTransfer(CreateTransfer),
    CreatePayout(CreatePayout),
    ReverseTransfer(ReverseTransfer),
    ReversePayout(ReversePayout),
    PollTransfer(PollTransfer),
    PollPayout(PollPayout),
    TerminateSchedules(TerminateSchedules),
}

impl WorkflowInput {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTransfer(_) => "create-transfer",
            Self::CreatePayout(_) => "create-payout",
            Self::ReverseTransfer(_) => "reverse-transfer",
            Self::ReversePayout(_) => "reverse-payout",
            Self::PollTransfer(_) => "poll-transfer",
            Self::PollPayout(_) => "poll-payout",
            Self::TerminateSchedules(_) => "terminate-schedules",
        }
    }

    pub fn connector_id(&self) -> &ConnectorId {
        match self {
            Self::CreateTransfer(req) => &req.connector_id,
            Self::CreatePayout(req) => &req.connector_id,
            Self::ReverseTransfer(req) => &req.connector_id,
            Self::ReversePayout(req) => &req.connector_id,
            Self::PollTransfer(req) => &req.connector_id,
            Self::PollPayout(req) => &req.connector_id,
            Self::TerminateSchedules(req) => &req.connector_id,
        }
    }

    pub fn is_poll(&self) -> bool {
        matches!(self, Self::PollTransfer(_) | Self::PollPayout(_))
    }

    /// Workflow id for one-shot workflows. Polls are keyed by their trigger
    /// firing instead, see `Engine::run_trigger`.
    pub fn workflow_id(&self) -> String {
        match self {
            Self::CreateTransfer(req) => format!("{}-{}", self.name(), req.task_id),
            Self::CreatePayout(req) => format!("{}-{}", self.name(), req.task_id),
            Self::ReverseTransfer(req) => format!("{}-{}", self.name(), req.task_id),
            Self::ReversePayout(req) => format!("{}-{}", self.name(), req.task_id),
            Self::PollTransfer(req) => format!("{}-{}", self.name(), req.schedule_id),
            Self::PollPayout(req) => format!("{}-{}", self.name(), req.schedule_id),
            Self::TerminateSchedules(req) => format!("{}-{}", self.name(), req.connector_id),
        }
    }
}

/// One firing of a recurring trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub schedule_id: String,
    pub fired_at: DateTime<Utc>,
    pub input: WorkflowInput,
}

impl Trigger {
    /// Each firing runs as its own workflow.
    pub fn workflow_id(&self) -> String {
        format!("{}@{}", self.schedule_id, self.fired_at.timestamp_micros())
    }
}
