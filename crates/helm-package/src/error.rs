use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("hash error: {0}")]
    Hash(#[from] helm_hash::HashError),

    #[error("ledger error: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
