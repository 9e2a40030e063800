use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hash error: {0}")]
    Hash(#[from] helm_hash::HashError),

    #[error("ledger error: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),

    #[error("capability violation in session {session_id}: missing {missing:?}, undeclared {undeclared:?}")]
    CapabilityViolation {
        session_id: String,
        missing: Vec<String>,
        undeclared: Vec<String>,
    },
}
