use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger write failed: {0}")]
    WriteFailed(String),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("chain broken at index {index}: {reason}")]
    ChainBroken { index: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("hashing error: {0}")]
    Hash(#[from] helm_hash::HashError),
}
