use crate::domain::amount::Amount;
use crate::domain::ids::{ConnectorId, PaymentInitiationId, PaymentInitiationReversalId, TaskId};
use crate::domain::payment_initiation::{Metadata, PaymentInitiation, PaymentInitiationType};
use crate::domain::reversal::PaymentInitiationReversal;
use crate::error::{EngineError, Result};
use crate::infrastructure::sandbox::MODE_KEY;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    Transfer,
    Payout,
    Reverse,
}

/// One row of an instructions file.
///
/// `reference` names the initiation (or the reversal, for `reverse` rows);
/// `target` is the reference of the initiation a reversal undoes. `mode`
/// is handed to the sandbox PSP through metadata.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Instruction {
    pub r#type: InstructionType,
    pub connector: String,
    pub reference: String,
    pub amount: Amount,
    pub asset: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl Instruction {
    pub fn connector_id(&self) -> ConnectorId {
        ConnectorId::new(self.connector.as_str())
    }

    pub fn task_id(&self) -> TaskId {
        TaskId::new(format!("task-{}", self.reference), self.connector_id())
    }

    fn metadata(&self) -> Metadata {
        self.mode
            .iter()
            .map(|mode| (MODE_KEY.to_string(), mode.clone()))
            .collect()
    }

    /// The initiation a `transfer` or `payout` row describes.
    pub fn payment_initiation(&self, created_at: DateTime<Utc>) -> Result<PaymentInitiation> {
        let kind = match self.r#type {
            InstructionType::Transfer => PaymentInitiationType::Transfer,
            InstructionType::Payout => PaymentInitiationType::Payout,
            InstructionType::Reverse => {
                return Err(EngineError::InvalidInput(format!(
                    "{} is a reversal, not a payment initiation",
                    self.reference
                )));
            }
        };
        let connector_id = self.connector_id();
        Ok(PaymentInitiation {
            id: PaymentInitiationId::new(self.reference.as_str(), connector_id.clone()),
            connector_id,
            reference: self.reference.clone(),
            created_at,
            scheduled_at: None,
            description: String::new(),
            kind,
            amount: self.amount,
            asset: self.asset.clone(),
            source_account_id: None,
            destination_account_id: None,
            metadata: self.metadata(),
        })
    }

    /// The reversal a `reverse` row describes.
    pub fn reversal(&self, created_at: DateTime<Utc>) -> Result<PaymentInitiationReversal> {
        let target = match (self.r#type, &self.target) {
            (InstructionType::Reverse, Some(target)) if !target.is_empty() => target,
            (InstructionType::Reverse, _) => {
                return Err(EngineError::InvalidInput(format!(
                    "reversal {} has no target",
                    self.reference
                )));
            }
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "{} is not a reversal",
                    self.reference
                )));
            }
        };
        let connector_id = self.connector_id();
        Ok(PaymentInitiationReversal {
            id: PaymentInitiationReversalId::new(self.reference.as_str(), connector_id.clone()),
            payment_initiation_id: PaymentInitiationId::new(target.as_str(), connector_id.clone()),
            connector_id,
            reference: self.reference.clone(),
            created_at,
            description: String::new(),
            amount: self.amount,
            asset: self.asset.clone(),
            metadata: self.metadata(),
        })
    }
}

/// Reads instructions from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and accepting rows that omit
/// trailing optional columns.
pub struct InstructionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> InstructionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes instructions, one `Result` per row.
    pub fn instructions(self) -> impl Iterator<Item = Result<Instruction>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(|e| EngineError::InvalidInput(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "type, connector, reference, amount, asset, target, mode";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\ntransfer, sandbox, pi_1, 1000, USD/2,, async\nreverse, sandbox, rev_1, 400, USD/2, pi_1"
        );
        let reader = InstructionReader::new(data.as_bytes());
        let results: Vec<Result<Instruction>> = reader.instructions().collect();

        assert_eq!(results.len(), 2);
        let transfer = results[0].as_ref().unwrap();
        assert_eq!(transfer.r#type, InstructionType::Transfer);
        assert_eq!(transfer.amount, Amount::from(1000));
        assert_eq!(transfer.target, None);
        assert_eq!(transfer.mode.as_deref(), Some("async"));

        let reverse = results[1].as_ref().unwrap();
        assert_eq!(reverse.target.as_deref(), Some("pi_1"));
        assert_eq!(reverse.mode, None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = format!("{HEADER}\nrefund, sandbox, pi_1, 10, USD/2,,");
        let reader = InstructionReader::new(data.as_bytes());
        let results: Vec<Result<Instruction>> = reader.instructions().collect();

        assert!(results[0].is_err());
    }

    #[test]
    fn test_fractional_minor_units_are_rejected() {
        let data = format!("{HEADER}\ntransfer, sandbox, pi_1, 10.5, USD/2,,");
        let reader = InstructionReader::new(data.as_bytes());
        let results: Vec<Result<Instruction>> = reader.instructions().collect();

        assert!(results[0].is_err());
    }

    #[test]
    fn test_reverse_row_builds_reversal() {
        let data = format!("{HEADER}\nreverse, sandbox, rev_1, 400, USD/2, pi_1, fail");
        let instruction = InstructionReader::new(data.as_bytes())
            .instructions()
            .next()
            .unwrap()
            .unwrap();

        let reversal = instruction.reversal(Utc::now()).unwrap();
        assert_eq!(reversal.payment_initiation_id.to_string(), "sandbox:pi_1");
        assert_eq!(reversal.metadata.get(MODE_KEY).map(String::as_str), Some("fail"));
        assert!(instruction.payment_initiation(Utc::now()).is_err());
    }
}
