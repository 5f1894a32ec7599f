use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a PSP connector instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectorId(pub String);

impl ConnectorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declares an identifier scoped to a connector: a PSP-side reference plus
/// the connector it belongs to. Renders as `connector:reference`.
macro_rules! connector_scoped_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            pub reference: String,
            pub connector_id: ConnectorId,
        }

        impl $name {
            pub fn new(reference: impl Into<String>, connector_id: ConnectorId) -> Self {
                Self {
                    reference: reference.into(),
                    connector_id,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", self.connector_id, self.reference)
            }
        }
    };
}

connector_scoped_id!(PaymentInitiationId);
connector_scoped_id!(PaymentInitiationReversalId);
connector_scoped_id!(PaymentId);
connector_scoped_id!(AccountId);
connector_scoped_id!(
    /// Bookkeeping record for one externally triggered operation.
    TaskId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_id_display() {
        let id = PaymentInitiationId::new("po_123", ConnectorId::new("stripe"));
        assert_eq!(id.to_string(), "stripe:po_123");
    }

    #[test]
    fn test_scoped_ids_order_by_reference_first() {
        let connector = ConnectorId::new("c");
        let a = PaymentId::new("a", connector.clone());
        let b = PaymentId::new("b", connector);
        assert!(a < b);
    }
}
