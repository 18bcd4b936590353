use crate::domain::ids::PaymentId;
use crate::domain::ports::TransferError;
use crate::domain::Timestamp;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Caller is not authorized for this resource")]
    NotAuthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Service is not accepting subscriptions")]
    InvalidSubscription,
    #[error("Amount must be positive")]
    InvalidAmount,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Subscription is not active")]
    NotActive,
    #[error("Payment not due until {next_due} (now {now})")]
    NotDue { next_due: Timestamp, now: Timestamp },
    #[error("Payment {payment_id} requires approval")]
    ApprovalRequired { payment_id: PaymentId },
    #[error("Payment is within the auto-pay threshold, no approval required")]
    ApprovalNotRequired,
    #[error("Approval for payment {payment_id} is no longer open")]
    ApprovalClosed { payment_id: PaymentId },
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Transfer failed: {0}")]
    TransferFailed(String),
    #[error("Storage schema version {found} does not match expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BillingError {
    fn from(e: rocksdb::Error) -> Self {
        BillingError::InternalError(Box::new(e))
    }
}

impl From<TransferError> for BillingError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::InsufficientFunds => BillingError::InsufficientFunds,
            TransferError::Rejected(reason) => BillingError::TransferFailed(reason),
        }
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(e: serde_json::Error) -> Self {
        BillingError::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
