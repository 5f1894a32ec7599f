use super::ids::{AccountId, ConnectorId};
use super::payment_initiation::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A PSP account known to the engine, referenced as the source or
/// destination of a payment initiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub connector_id: ConnectorId,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub default_asset: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PspAccount {
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub default_asset: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<Account> for PspAccount {
    fn from(account: Account) -> Self {
        Self {
            reference: account.reference,
            created_at: account.created_at,
            name: account.name,
            default_asset: account.default_asset,
            metadata: account.metadata,
        }
    }
}
