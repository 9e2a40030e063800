use thiserror::Error;

use crate::workorder::WoError;

/// Umbrella error composed from every `helm-*` crate's local error enum. Each
/// crate keeps its own narrower enum for local matching; this type is what
/// crosses a component boundary back up to `helm-session`/`helm-cli`.
#[derive(Debug, Error)]
pub enum HelmError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("capability violation: {0}")]
    CapabilityViolation(String),

    #[error("budget exhausted at scope {scope}: requested {requested}, remaining {remaining}")]
    BudgetExhausted {
        scope: String,
        requested: u64,
        remaining: u64,
    },

    #[error("gateway rejection: {code}")]
    GatewayRejection { code: String },

    #[error("timeout after {elapsed_ms}ms in {context}")]
    Timeout { context: String, elapsed_ms: u64 },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("output invalid: {0}")]
    OutputInvalid(String),

    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("work order error: {0}")]
    WorkOrder(#[from] WoError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HelmError {
    /// The stable error code surfaced on `WoErrorInfo.code` / `TurnResult.error`.
    pub fn code(&self) -> &'static str {
        match self {
            HelmError::Validation(_) => "VALIDATION_ERROR",
            HelmError::Integrity(_) => "INTEGRITY_ERROR",
            HelmError::CapabilityViolation(_) => "CAPABILITY_VIOLATION",
            HelmError::BudgetExhausted { .. } => "BUDGET_EXHAUSTED",
            HelmError::GatewayRejection { .. } => "GATEWAY_REJECTION",
            HelmError::Timeout { .. } => "TIMEOUT",
            HelmError::Provider(_) => "PROVIDER_ERROR",
            HelmError::OutputInvalid(_) => "OUTPUT_INVALID",
            HelmError::LedgerWriteFailed(_) => "LEDGER_WRITE_FAILED",
            HelmError::WorkOrder(_) => "WORK_ORDER_ERROR",
            HelmError::Config(_) => "CONFIG_ERROR",
            HelmError::Io(_) => "IO_ERROR",
            HelmError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}
