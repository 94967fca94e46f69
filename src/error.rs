use crate::domain::account::{AccountId, Currency};
use crate::domain::operation::OperationId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Boxed error coming out of a storage or coordination backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = PaymentError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("account ({0}) not found")]
    AccountNotFound(AccountId),
    #[error("operation ({0}) not found")]
    OperationNotFound(OperationId),
    #[error(
        "accounts currencies must be same: requested {requested}, account ({account}) holds {held}"
    )]
    DifferentCurrencies {
        account: AccountId,
        requested: Currency,
        held: Currency,
    },
    #[error("balance too low: account ({account}) holds {balance}, requested {requested}")]
    BalanceTooLow {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },
    #[error(
        "balance out of range: account ({account}) holds {balance}, cannot apply {amount} exactly"
    )]
    BalanceOutOfRange {
        account: AccountId,
        balance: Decimal,
        amount: Decimal,
    },
    #[error("mutex ({key}) locking failed: {reason}")]
    LockAcquisitionFailed { key: String, reason: String },
    #[error("mutex ({key}) releasing failed: {reason}")]
    LockReleaseFailed { key: String, reason: String },
    #[error("{context}: unit of work creating failed: {source}")]
    TransactionBeginFailed {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("{context}: {source}")]
    StoreFailure {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PaymentError {
    /// Wraps a backend failure with a description of what was being done.
    pub fn store(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::StoreFailure {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn begin_failed(source: impl Into<BoxError>) -> Self {
        Self::TransactionBeginFailed {
            context: "session".to_string(),
            source: source.into(),
        }
    }

    /// Prefixes infrastructure failures with operation-identifying context.
    ///
    /// Domain errors are returned untouched so callers can keep matching on them.
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::StoreFailure {
                context: inner,
                source,
            } => Self::StoreFailure {
                context: format!("{context}: {inner}"),
                source,
            },
            Self::TransactionBeginFailed {
                context: inner,
                source,
            } => Self::TransactionBeginFailed {
                context: format!("{context}: {inner}"),
                source,
            },
            Self::LockAcquisitionFailed { key, reason } => Self::LockAcquisitionFailed {
                key,
                reason: format!("{context}: {reason}"),
            },
            other => other,
        }
    }

    /// Caller-correctable conditions, as opposed to infrastructure faults.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::OperationNotFound(_)
                | Self::DifferentCurrencies { .. }
                | Self::BalanceTooLow { .. }
                | Self::BalanceOutOfRange { .. }
                | Self::ValidationError(_)
        )
    }

    /// Stable machine-readable code for transport adapters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::OperationNotFound(_) => "operation_not_found",
            Self::DifferentCurrencies { .. } => "different_currencies",
            Self::BalanceTooLow { .. } => "balance_too_low",
            Self::BalanceOutOfRange { .. } => "balance_out_of_range",
            Self::LockAcquisitionFailed { .. } => "lock_acquisition_failed",
            Self::LockReleaseFailed { .. } => "lock_release_failed",
            Self::TransactionBeginFailed { .. } => "transaction_begin_failed",
            Self::StoreFailure { .. } => "store_failure",
            Self::ValidationError(_) => "validation_error",
            Self::CsvError(_) => "csv_error",
            Self::IoError(_) => "io_error",
        }
    }
}

/// JSON body a transport layer sends back for a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

impl From<&PaymentError> for ErrorBody {
    fn from(err: &PaymentError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}
