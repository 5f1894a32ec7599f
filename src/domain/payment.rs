use super::amount::Amount;
use super::ids::{AccountId, ConnectorId, PaymentId};
use super::payment_initiation::{AdjustmentStatus, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    PayIn,
    Payout,
    Transfer,
    Other,
}

/// Status of a payment as reported by the PSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Cancelled,
    Failed,
    Expired,
    Refunded,
    RefundedFailure,
    RefundReversed,
    Dispute,
    DisputeWon,
    DisputeLost,
    Authorisation,
    Capture,
    CaptureFailed,
    Other,
}

impl PaymentStatus {
    /// Adjustment recorded on the owning initiation when a payment reaches
    /// this status, with the error text attached to failure statuses.
    pub fn adjustment(self) -> (AdjustmentStatus, Option<&'static str>) {
        match self {
            Self::Succeeded | Self::Capture | Self::RefundReversed => {
                (AdjustmentStatus::Processed, None)
            }
            Self::Cancelled | Self::CaptureFailed | Self::Failed | Self::Expired => {
                (AdjustmentStatus::Failed, Some("payment failed"))
            }
            Self::Pending | Self::Authorisation => (AdjustmentStatus::Processing, None),
            Self::Refunded => (AdjustmentStatus::Reversed, None),
            Self::RefundedFailure => (AdjustmentStatus::ReverseFailed, Some("payment refund failed")),
            Self::Dispute | Self::DisputeWon | Self::DisputeLost | Self::Other => {
                (AdjustmentStatus::Unknown, None)
            }
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Refunded => "REFUNDED",
            Self::RefundedFailure => "REFUNDED_FAILURE",
            Self::RefundReversed => "REFUND_REVERSED",
            Self::Dispute => "DISPUTE",
            Self::DisputeWon => "DISPUTE_WON",
            Self::DisputeLost => "DISPUTE_LOST",
            Self::Authorisation => "AUTHORISATION",
            Self::Capture => "CAPTURE",
            Self::CaptureFailed => "CAPTURE_FAILED",
            Self::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// A payment as returned by a plugin, before it is attached to a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PspPayment {
    pub reference: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub asset: String,
    pub source_account_reference: Option<String>,
    pub destination_account_reference: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub connector_id: ConnectorId,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: PaymentType,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub asset: String,
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: Option<AccountId>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Payment {
    pub fn from_psp(psp: PspPayment, connector_id: &ConnectorId) -> Self {
        let account = |reference: Option<String>| {
            reference.map(|reference| AccountId::new(reference, connector_id.clone()))
        };
        Self {
            id: PaymentId::new(psp.reference.clone(), connector_id.clone()),
            connector_id: connector_id.clone(),
            reference: psp.reference,
            created_at: psp.created_at,
            kind: psp.kind,
            status: psp.status,
            amount: psp.amount,
            asset: psp.asset,
            source_account_id: account(psp.source_account_reference),
            destination_account_id: account(psp.destination_account_reference),
            metadata: psp.metadata,
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.id,
            self.status,
            self.created_at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_maps_to_adjustment() {
        use AdjustmentStatus as A;
        let cases = [
            (PaymentStatus::Succeeded, A::Processed),
            (PaymentStatus::Capture, A::Processed),
            (PaymentStatus::RefundReversed, A::Processed),
            (PaymentStatus::Cancelled, A::Failed),
            (PaymentStatus::CaptureFailed, A::Failed),
            (PaymentStatus::Failed, A::Failed),
            (PaymentStatus::Expired, A::Failed),
            (PaymentStatus::Pending, A::Processing),
            (PaymentStatus::Authorisation, A::Processing),
            (PaymentStatus::Refunded, A::Reversed),
            (PaymentStatus::RefundedFailure, A::ReverseFailed),
            (PaymentStatus::Dispute, A::Unknown),
            (PaymentStatus::Other, A::Unknown),
        ];
        for (payment, expected) in cases {
            assert_eq!(payment.adjustment().0, expected, "{payment}");
        }
    }

    #[test]
    fn test_failed_statuses_carry_an_error() {
        assert_eq!(PaymentStatus::Expired.adjustment().1, Some("payment failed"));
        assert_eq!(PaymentStatus::Succeeded.adjustment().1, None);
    }

    #[test]
    fn test_status_display_matches_wire_name() {
        assert_eq!(PaymentStatus::RefundedFailure.to_string(), "REFUNDED_FAILURE");
    }
}
