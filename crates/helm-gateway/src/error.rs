use thiserror::Error;

/// Errors that abort a `route()` call outright, as opposed to a business
/// rejection (`AUTH_ERROR`, `BUDGET_EXHAUSTED`, `CIRCUIT_OPEN`, ...), which is
/// surfaced as a normal `PromptResponse` with `outcome = Rejected`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("budget scope error: {0}")]
    Budget(#[from] helm_budget::BudgetError),
}
