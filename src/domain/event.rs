use super::ids::ConnectorId;
use super::payment::Payment;
use super::payment_initiation::{PaymentInitiationAdjustment, PaymentInitiationRelatedPayment};
use super::reversal::PaymentInitiationReversalAdjustment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound notification about a ledger or payment change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    PaymentInitiationAdjustment(PaymentInitiationAdjustment),
    PaymentInitiationReversalAdjustment(PaymentInitiationReversalAdjustment),
    PaymentInitiationRelatedPayment(PaymentInitiationRelatedPayment),
    Payment(Payment),
}

impl Event {
    /// Stable key used to deduplicate deliveries across retries and replays.
    pub fn idempotency_key(&self) -> String {
        match self {
            Self::PaymentInitiationAdjustment(adj) => format!("pi-adjustment/{}", adj.idempotency_key()),
            Self::PaymentInitiationReversalAdjustment(adj) => {
                format!("pi-reversal-adjustment/{}", adj.idempotency_key())
            }
            Self::PaymentInitiationRelatedPayment(link) => format!(
                "pi-related-payment/{}/{}",
                link.payment_initiation_id, link.payment_id
            ),
            Self::Payment(payment) => format!("payment/{}", payment.idempotency_key()),
        }
    }

    pub fn connector_id(&self) -> &ConnectorId {
        match self {
            Self::PaymentInitiationAdjustment(adj) => &adj.payment_initiation_id().connector_id,
            Self::PaymentInitiationReversalAdjustment(adj) => &adj.reversal_id().connector_id,
            Self::PaymentInitiationRelatedPayment(link) => &link.payment_initiation_id.connector_id,
            Self::Payment(payment) => &payment.connector_id,
        }
    }
}

/// Record that an event with a given idempotency key was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSent {
    pub idempotency_key: String,
    pub connector_id: ConnectorId,
    pub sent_at: DateTime<Utc>,
}
