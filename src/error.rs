use crate::domain::amount::Amount;
use crate::domain::ids::ConnectorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors raised by a storage or journal backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("codec error: {0}")]
    Codec(String),
}

impl StorageError {
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn codec(err: impl fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Errors reported by a PSP plugin.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    /// Network failures, timeouts, rate limits. Worth retrying.
    #[error("transient plugin error: {0}")]
    Transient(String),
    /// The PSP refused the operation.
    #[error("{0}")]
    Rejected(String),
    #[error("operation not supported by plugin: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("schedule {0} already exists")]
    AlreadyExists(String),
    #[error("schedule {0} not found")]
    NotFound(String),
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount {0} is not an integer number of minor units")]
    FractionalMinorUnits(rust_decimal::Decimal),
    #[error("amount arithmetic overflowed")]
    Overflow,
    #[error("invalid amount: {0}")]
    Invalid(String),
}

/// Error returned by a single attempt of an activity.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ActivityError {
    pub message: String,
    pub retryable: bool,
}

impl ActivityError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<StorageError> for ActivityError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) | StorageError::Codec(_) => Self::non_retryable(err.to_string()),
            StorageError::Backend(_) => Self::retryable(err.to_string()),
        }
    }
}

impl From<PluginError> for ActivityError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Transient(_) => Self::retryable(err.to_string()),
            PluginError::Rejected(_) | PluginError::Unsupported(_) => {
                Self::non_retryable(err.to_string())
            }
        }
    }
}

impl From<SchedulerError> for ActivityError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Unavailable(_) => Self::retryable(err.to_string()),
            _ => Self::non_retryable(err.to_string()),
        }
    }
}

impl From<SinkError> for ActivityError {
    fn from(err: SinkError) -> Self {
        Self::retryable(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NonRetryable,
    RetriesExhausted,
}

/// Terminal outcome of an activity that did not succeed. Journaled, so a
/// replayed workflow observes the same failure without calling out again.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ActivityFailure {
    pub step: String,
    pub message: String,
    pub attempts: u32,
    pub kind: FailureKind,
}

/// Business-rule rejections of a reversal. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReversalRejection {
    #[error("PAYMENT_INITIATION_NOT_PROCESSED: payment initiation {0} has no processed adjustment")]
    NotProcessed(String),
    #[error(
        "CANNOT_REVERSE_MORE_THAN_AMOUNT: requested {requested}, remaining {remaining}"
    )]
    CannotReverseMoreThanAmount { remaining: Amount, requested: Amount },
    #[error("ANOTHER_REVERSE_IN_PROGRESS: payment initiation {0} is already being reversed")]
    AnotherReverseInProgress(String),
}

impl ReversalRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotProcessed(_) => "PAYMENT_INITIATION_NOT_PROCESSED",
            Self::CannotReverseMoreThanAmount { .. } => "CANNOT_REVERSE_MORE_THAN_AMOUNT",
            Self::AnotherReverseInProgress(_) => "ANOTHER_REVERSE_IN_PROGRESS",
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Activity(#[from] ActivityFailure),
    #[error(transparent)]
    Rejected(#[from] ReversalRejection),
    /// Terminal failure reported by the PSP while polling.
    #[error("{0}")]
    Psp(String),
    #[error("journal error: {0}")]
    Journal(StorageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("no plugin registered for connector {0}")]
    ConnectorNotFound(ConnectorId),
    #[error("invalid workflow input: {0}")]
    InvalidInput(String),
    /// The task record could not be written after the workflow produced its
    /// outcome. Both are kept.
    #[error("{}task bookkeeping failed: {bookkeeping}", outcome_prefix(.outcome))]
    Bookkeeping {
        outcome: Option<Box<EngineError>>,
        bookkeeping: Box<EngineError>,
    },
}

fn outcome_prefix(outcome: &Option<Box<EngineError>>) -> String {
    match outcome {
        Some(err) => format!("{err}; "),
        None => String::new(),
    }
}

impl EngineError {
    /// The business outcome, looking through bookkeeping failures.
    pub fn outcome(&self) -> Option<&EngineError> {
        match self {
            Self::Bookkeeping { outcome, .. } => outcome.as_deref(),
            other => Some(other),
        }
    }

    pub fn rejection(&self) -> Option<&ReversalRejection> {
        match self.outcome()? {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_is_not_retried() {
        let err: ActivityError = StorageError::not_found("payment initiation x").into();
        assert!(!err.retryable);
        let err: ActivityError = StorageError::Backend("connection reset".into()).into();
        assert!(err.retryable);
    }

    #[test]
    fn test_plugin_rejection_is_not_retried() {
        let err: ActivityError = PluginError::Rejected("insufficient funds".into()).into();
        assert!(!err.retryable);
        assert_eq!(err.message, "insufficient funds");
    }

    #[test]
    fn test_rejection_codes_are_rendered_verbatim() {
        let rejection = ReversalRejection::AnotherReverseInProgress("pi".into());
        assert!(rejection.to_string().starts_with("ANOTHER_REVERSE_IN_PROGRESS"));
        assert_eq!(rejection.code(), "ANOTHER_REVERSE_IN_PROGRESS");
    }

    #[test]
    fn test_bookkeeping_error_keeps_both_outcomes() {
        let err = EngineError::Bookkeeping {
            outcome: Some(Box::new(EngineError::Psp("card declined".into()))),
            bookkeeping: Box::new(EngineError::Journal(StorageError::Backend("down".into()))),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("card declined"));
        assert!(rendered.contains("task bookkeeping failed"));
        assert!(matches!(err.outcome(), Some(EngineError::Psp(_))));
    }
}
