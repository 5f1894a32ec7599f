use crate::domain::payment::{PaymentStatus, PaymentType, PspPayment};
use crate::domain::payment_initiation::{Metadata, PspPaymentInitiation};
use crate::domain::plugin::*;
use crate::domain::ports::Plugin;
use crate::domain::reversal::PspPaymentInitiationReversal;
use crate::error::PluginError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Metadata key selecting how the sandbox PSP treats an initiation or a
/// reversal. See [`SandboxMode`].
pub const MODE_KEY: &str = "sandbox/mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    /// Settles synchronously.
    Sync,
    /// Returns a polling id; settles after a few polls.
    Async,
    /// Returns a polling id; the poll reports a PSP error.
    PspError,
    /// Rejects the call outright.
    Fail,
}

impl SandboxMode {
    fn of(metadata: &Metadata) -> Self {
        match metadata.get(MODE_KEY).map(String::as_str) {
            Some("async") => Self::Async,
            Some("psp-error") => Self::PspError,
            Some("fail") => Self::Fail,
            _ => Self::Sync,
        }
    }
}

struct Pending {
    polls: u32,
    payment: PspPayment,
    fails: bool,
}

/// A deterministic in-process PSP, for demos and tests.
pub struct SandboxPlugin {
    polls_to_settle: u32,
    pending: Mutex<HashMap<String, Pending>>,
}

impl Default for SandboxPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxPlugin {
    pub fn new() -> Self {
        Self::with_polls_to_settle(2)
    }

    /// Asynchronous operations resolve on the `polls`-th status poll.
    pub fn with_polls_to_settle(polls: u32) -> Self {
        Self {
            polls_to_settle: polls.max(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn payment(pi: &PspPaymentInitiation, kind: PaymentType) -> PspPayment {
        PspPayment {
            reference: pi.reference.clone(),
            created_at: Utc::now(),
            kind,
            status: PaymentStatus::Succeeded,
            amount: pi.amount,
            asset: pi.asset.clone(),
            source_account_reference: pi.source_account.as_ref().map(|a| a.reference.clone()),
            destination_account_reference: pi
                .destination_account
                .as_ref()
                .map(|a| a.reference.clone()),
            metadata: Metadata::new(),
        }
    }

    async fn initiate(
        &self,
        pi: &PspPaymentInitiation,
        kind: PaymentType,
    ) -> Result<InitiationOutcome, PluginError> {
        let payment = Self::payment(pi, kind);
        match SandboxMode::of(&pi.metadata) {
            SandboxMode::Fail => Err(PluginError::Rejected(format!(
                "sandbox rejected {}",
                pi.reference
            ))),
            SandboxMode::Sync => Ok(InitiationOutcome {
                payment: Some(payment),
                polling_id: None,
            }),
            mode @ (SandboxMode::Async | SandboxMode::PspError) => {
                let polling_id = format!("sbx_{}", pi.reference);
                self.pending.lock().await.insert(
                    polling_id.clone(),
                    Pending {
                        polls: 0,
                        payment,
                        fails: mode == SandboxMode::PspError,
                    },
                );
                Ok(InitiationOutcome {
                    payment: None,
                    polling_id: Some(polling_id),
                })
            }
        }
    }

    async fn poll(&self, polling_id: &str) -> Result<PollOutcome, PluginError> {
        let mut pending = self.pending.lock().await;
        let entry = pending
            .get_mut(polling_id)
            .ok_or_else(|| PluginError::Rejected(format!("unknown polling id {polling_id}")))?;
        entry.polls += 1;
        if entry.polls < self.polls_to_settle {
            return Ok(PollOutcome::default());
        }
        let Some(settled) = pending.remove(polling_id) else {
            return Ok(PollOutcome::default());
        };
        if settled.fails {
            return Ok(PollOutcome {
                payment: None,
                error: Some("sandbox: insufficient funds".to_string()),
            });
        }
        Ok(PollOutcome {
            payment: Some(settled.payment),
            error: None,
        })
    }

    fn reverse(
        reversal: &PspPaymentInitiationReversal,
        kind: PaymentType,
    ) -> Result<PspPayment, PluginError> {
        if SandboxMode::of(&reversal.metadata) == SandboxMode::Fail {
            return Err(PluginError::Rejected(format!(
                "sandbox rejected reversal {}",
                reversal.reference
            )));
        }
        let mut payment = Self::payment(&reversal.related_payment_initiation, kind);
        payment.reference = reversal.reference.clone();
        payment.status = PaymentStatus::Refunded;
        payment.amount = reversal.amount;
        payment.asset = reversal.asset.clone();
        Ok(payment)
    }
}

#[async_trait]
impl Plugin for SandboxPlugin {
    async fn create_transfer(
        &self,
        req: CreateTransferRequest,
    ) -> Result<CreateTransferResponse, PluginError> {
        let outcome = self
            .initiate(&req.payment_initiation, PaymentType::Transfer)
            .await?;
        Ok(CreateTransferResponse {
            payment: outcome.payment,
            polling_transfer_id: outcome.polling_id,
        })
    }

    async fn reverse_transfer(
        &self,
        req: ReverseTransferRequest,
    ) -> Result<ReverseTransferResponse, PluginError> {
        let payment = Self::reverse(&req.payment_initiation_reversal, PaymentType::Transfer)?;
        Ok(ReverseTransferResponse { payment })
    }

    async fn poll_transfer_status(
        &self,
        req: PollTransferStatusRequest,
    ) -> Result<PollTransferStatusResponse, PluginError> {
        let outcome = self.poll(&req.transfer_id).await?;
        Ok(PollTransferStatusResponse {
            payment: outcome.payment,
            error: outcome.error,
        })
    }

    async fn create_payout(
        &self,
        req: CreatePayoutRequest,
    ) -> Result<CreatePayoutResponse, PluginError> {
        let outcome = self
            .initiate(&req.payment_initiation, PaymentType::Payout)
            .await?;
        Ok(CreatePayoutResponse {
            payment: outcome.payment,
            polling_payout_id: outcome.polling_id,
        })
    }

    async fn reverse_payout(
        &self,
        req: ReversePayoutRequest,
    ) -> Result<ReversePayoutResponse, PluginError> {
        let payment = Self::reverse(&req.payment_initiation_reversal, PaymentType::Payout)?;
        Ok(ReversePayoutResponse { payment })
    }

    async fn poll_payout_status(
        &self,
        req: PollPayoutStatusRequest,
    ) -> Result<PollPayoutStatusResponse, PluginError> {
        let outcome = self.poll(&req.payout_id).await?;
        Ok(PollPayoutStatusResponse {
            payment: outcome.payment,
            error: outcome.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::Amount;

    fn pi(mode: Option<&str>) -> PspPaymentInitiation {
        let mut metadata = Metadata::new();
        if let Some(mode) = mode {
            metadata.insert(MODE_KEY.to_string(), mode.to_string());
        }
        PspPaymentInitiation {
            reference: "ref".into(),
            created_at: Utc::now(),
            description: String::new(),
            source_account: None,
            destination_account: None,
            amount: Amount::from(500),
            asset: "USD/2".into(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_async_transfer_settles_after_polls() {
        let plugin = SandboxPlugin::with_polls_to_settle(2);
        let created = plugin
            .create_transfer(CreateTransferRequest {
                payment_initiation: pi(Some("async")),
            })
            .await
            .unwrap();
        let transfer_id = created.polling_transfer_id.unwrap();

        let req = PollTransferStatusRequest { transfer_id };
        let first = plugin.poll_transfer_status(req.clone()).await.unwrap();
        assert!(first.payment.is_none() && first.error.is_none());
        let second = plugin.poll_transfer_status(req.clone()).await.unwrap();
        assert_eq!(second.payment.unwrap().status, PaymentStatus::Succeeded);
        assert!(plugin.poll_transfer_status(req).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_mode_rejects() {
        let plugin = SandboxPlugin::new();
        let err = plugin
            .create_payout(CreatePayoutRequest {
                payment_initiation: pi(Some("fail")),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Rejected(_)));
    }
}
