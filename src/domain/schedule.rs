use super::ids::ConnectorId;
use super::workflow::OperationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping row for a recurring trigger registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub connector_id: ConnectorId,
    pub created_at: DateTime<Utc>,
}

/// `polling-{transfer|payout}-{stack}-{connector}-{polling id}`.
pub fn polling_schedule_id(
    kind: OperationKind,
    stack: &str,
    connector_id: &ConnectorId,
    polling_id: &str,
) -> String {
    format!("polling-{}-{stack}-{connector_id}-{polling_id}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_schedule_ids() {
        let connector = ConnectorId::new("wise");
        assert_eq!(
            polling_schedule_id(OperationKind::Transfer, "eu1", &connector, "tr_9"),
            "polling-transfer-eu1-wise-tr_9"
        );
        assert_eq!(
            polling_schedule_id(OperationKind::Payout, "eu1", &connector, "po_1"),
            "polling-payout-eu1-wise-po_1"
        );
    }
}
