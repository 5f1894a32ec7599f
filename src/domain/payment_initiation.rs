use super::account::PspAccount;
use super::amount::Amount;
use super::ids::{AccountId, ConnectorId, PaymentId, PaymentInitiationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentInitiationType {
    Transfer,
    Payout,
}

impl fmt::Display for PaymentInitiationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer => f.write_str("TRANSFER"),
            Self::Payout => f.write_str("PAYOUT"),
        }
    }
}

/// A request to move money through a PSP. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub id: PaymentInitiationId,
    pub connector_id: ConnectorId,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PaymentInitiationType,
    pub amount: Amount,
    pub asset: String,
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: Option<AccountId>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Status of a payment initiation adjustment. The current status of an
/// initiation is the status of its latest adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentStatus {
    Unknown,
    WaitingForValidation,
    ScheduledForProcessing,
    Processing,
    Processed,
    Failed,
    Rejected,
    ReverseProcessing,
    ReverseFailed,
    Reversed,
}

impl AdjustmentStatus {
    pub const ALL: [AdjustmentStatus; 10] = [
        Self::Unknown,
        Self::WaitingForValidation,
        Self::ScheduledForProcessing,
        Self::Processing,
        Self::Processed,
        Self::Failed,
        Self::Rejected,
        Self::ReverseProcessing,
        Self::ReverseFailed,
        Self::Reversed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::WaitingForValidation => "WAITING_FOR_VALIDATION",
            Self::ScheduledForProcessing => "SCHEDULED_FOR_PROCESSING",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::ReverseProcessing => "REVERSE_PROCESSING",
            Self::ReverseFailed => "REVERSE_FAILED",
            Self::Reversed => "REVERSED",
        }
    }

    /// Stable single-byte code, used by storage backends that order keys.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown adjustment status {s}"))
    }
}

/// Natural key of an adjustment. Appending the same key twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjustmentId {
    pub payment_initiation_id: PaymentInitiationId,
    pub created_at: DateTime<Utc>,
    pub status: AdjustmentStatus,
}

impl fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.payment_initiation_id,
            self.created_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            self.status
        )
    }
}

/// Immutable ledger record of a status transition of a payment initiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiationAdjustment {
    pub id: AdjustmentId,
    pub created_at: DateTime<Utc>,
    pub status: AdjustmentStatus,
    pub amount: Option<Amount>,
    pub asset: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PaymentInitiationAdjustment {
    pub fn new(
        payment_initiation_id: PaymentInitiationId,
        created_at: DateTime<Utc>,
        status: AdjustmentStatus,
    ) -> Self {
        Self {
            id: AdjustmentId {
                payment_initiation_id,
                created_at,
                status,
            },
            created_at,
            status,
            amount: None,
            asset: None,
            error: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_amount(mut self, amount: Amount, asset: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.asset = Some(asset.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn payment_initiation_id(&self) -> &PaymentInitiationId {
        &self.id.payment_initiation_id
    }

    pub fn idempotency_key(&self) -> String {
        self.id.to_string()
    }
}

/// Current status of an initiation: the latest adjustment by `created_at`,
/// ties broken by the order in which adjustments appear in `log`.
pub fn current_status(log: &[PaymentInitiationAdjustment]) -> Option<AdjustmentStatus> {
    log.iter()
        .enumerate()
        .max_by_key(|(index, adjustment)| (adjustment.created_at, *index))
        .map(|(_, adjustment)| adjustment.status)
}

/// Link between an initiation and a payment the PSP produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiationRelatedPayment {
    pub payment_initiation_id: PaymentInitiationId,
    pub payment_id: PaymentId,
    pub created_at: DateTime<Utc>,
}

/// The initiation as handed to a plugin, with accounts resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PspPaymentInitiation {
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub source_account: Option<PspAccount>,
    pub destination_account: Option<PspAccount>,
    pub amount: Amount,
    pub asset: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl PspPaymentInitiation {
    pub fn from_payment_initiation(
        pi: &PaymentInitiation,
        source_account: Option<PspAccount>,
        destination_account: Option<PspAccount>,
    ) -> Self {
        Self {
            reference: pi.reference.clone(),
            created_at: pi.created_at,
            description: pi.description.clone(),
            source_account,
            destination_account,
            amount: pi.amount,
            asset: pi.asset.clone(),
            metadata: pi.metadata.clone(),
        }
    }
}
