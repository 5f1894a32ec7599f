use super::amount::Amount;
use super::ids::{ConnectorId, PaymentInitiationId, PaymentInitiationReversalId};
use super::payment_initiation::{Metadata, PspPaymentInitiation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request to undo all or part of a processed payment initiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiationReversal {
    pub id: PaymentInitiationReversalId,
    pub connector_id: ConnectorId,
    pub payment_initiation_id: PaymentInitiationId,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub amount: Amount,
    pub asset: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReversalStatus {
    Unknown,
    Processing,
    Processed,
    Failed,
}

impl ReversalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ReversalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReversalAdjustmentId {
    pub reversal_id: PaymentInitiationReversalId,
    pub created_at: DateTime<Utc>,
    pub status: ReversalStatus,
}

impl fmt::Display for ReversalAdjustmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.reversal_id,
            self.created_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            self.status
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiationReversalAdjustment {
    pub id: ReversalAdjustmentId,
    pub created_at: DateTime<Utc>,
    pub status: ReversalStatus,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PaymentInitiationReversalAdjustment {
    pub fn new(
        reversal_id: PaymentInitiationReversalId,
        created_at: DateTime<Utc>,
        status: ReversalStatus,
    ) -> Self {
        Self {
            id: ReversalAdjustmentId {
                reversal_id,
                created_at,
                status,
            },
            created_at,
            status,
            error: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn reversal_id(&self) -> &PaymentInitiationReversalId {
        &self.id.reversal_id
    }

    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }
}

/// The reversal as handed to a plugin, embedding the initiation it undoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PspPaymentInitiationReversal {
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub related_payment_initiation: PspPaymentInitiation,
    pub amount: Amount,
    pub asset: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PspPaymentInitiationReversal {
    pub fn new(reversal: &PaymentInitiationReversal, related: PspPaymentInitiation) -> Self {
        Self {
            reference: reversal.reference.clone(),
            created_at: reversal.created_at,
            description: reversal.description.clone(),
            related_payment_initiation: related,
            amount: reversal.amount,
            asset: reversal.asset.clone(),
            metadata: reversal.metadata.clone(),
        }
    }
}
