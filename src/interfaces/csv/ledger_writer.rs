use crate::domain::amount::Amount;
use crate::domain::payment_initiation::{AdjustmentStatus, PaymentInitiationAdjustment};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow<'a> {
    payment_initiation: String,
    created_at: String,
    status: AdjustmentStatus,
    amount: Option<Amount>,
    asset: Option<&'a str>,
    error: Option<&'a str>,
}

/// Writes adjustment logs as CSV, one row per adjustment.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_adjustments<'a>(
        &mut self,
        adjustments: impl IntoIterator<Item = &'a PaymentInitiationAdjustment>,
    ) -> csv::Result<()> {
        for adj in adjustments {
            self.writer.serialize(LedgerRow {
                payment_initiation: adj.payment_initiation_id().to_string(),
                created_at: adj
                    .created_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
                status: adj.status,
                amount: adj.amount,
                asset: adj.asset.as_deref(),
                error: adj.error.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{ConnectorId, PaymentInitiationId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_writes_header_and_rows() {
        let pi = PaymentInitiationId::new("pi_1", ConnectorId::new("sandbox"));
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let log = vec![
            PaymentInitiationAdjustment::new(pi.clone(), at, AdjustmentStatus::Processing)
                .with_amount(Amount::from(100), "USD/2"),
            PaymentInitiationAdjustment::new(pi, at, AdjustmentStatus::Failed)
                .with_error("card declined"),
        ];

        let mut buffer = Vec::new();
        LedgerWriter::new(&mut buffer).write_adjustments(&log).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "payment_initiation,created_at,status,amount,asset,error"
        );
        assert_eq!(
            lines[1],
            "sandbox:pi_1,2023-11-14T22:13:20.000000Z,PROCESSING,100,USD/2,"
        );
        assert_eq!(
            lines[2],
            "sandbox:pi_1,2023-11-14T22:13:20.000000Z,FAILED,,,card declined"
        );
    }
}
