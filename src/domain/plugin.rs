use super::payment::PspPayment;
use super::payment_initiation::PspPaymentInitiation;
use super::reversal::PspPaymentInitiationReversal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub payment_initiation: PspPaymentInitiation,
}

/// Either the PSP settled synchronously (`payment`) or it handed back an id
/// to poll (`polling_transfer_id`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateTransferResponse {
    pub payment: Option<PspPayment>,
    pub polling_transfer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePayoutRequest {
    pub payment_initiation: PspPaymentInitiation,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreatePayoutResponse {
    pub payment: Option<PspPayment>,
    pub polling_payout_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseTransferRequest {
    pub payment_initiation_reversal: PspPaymentInitiationReversal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseTransferResponse {
    pub payment: PspPayment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversePayoutRequest {
    pub payment_initiation_reversal: PspPaymentInitiationReversal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversePayoutResponse {
    pub payment: PspPayment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollTransferStatusRequest {
    pub transfer_id: String,
}

/// Neither field set means the transfer is still pending.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PollTransferStatusResponse {
    pub payment: Option<PspPayment>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPayoutStatusRequest {
    pub payout_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PollPayoutStatusResponse {
    pub payment: Option<PspPayment>,
    pub error: Option<String>,
}

/// Result of creating a transfer or payout, independent of which one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InitiationOutcome {
    pub payment: Option<PspPayment>,
    pub polling_id: Option<String>,
}

impl From<CreateTransferResponse> for InitiationOutcome {
    fn from(res: CreateTransferResponse) -> Self {
        Self {
            payment: res.payment,
            polling_id: res.polling_transfer_id,
        }
    }
}

impl From<CreatePayoutResponse> for InitiationOutcome {
    fn from(res: CreatePayoutResponse) -> Self {
        Self {
            payment: res.payment,
            polling_id: res.polling_payout_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PollOutcome {
    pub payment: Option<PspPayment>,
    pub error: Option<String>,
}

impl From<PollTransferStatusResponse> for PollOutcome {
    fn from(res: PollTransferStatusResponse) -> Self {
        Self {
            payment: res.payment,
            error: res.error,
        }
    }
}

impl From<PollPayoutStatusResponse> for PollOutcome {
    fn from(res: PollPayoutStatusResponse) -> Self {
        Self {
            payment: res.payment,
            error: res.error,
        }
    }
}
