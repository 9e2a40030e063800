use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("budget error: {0}")]
    Budget(#[from] helm_budget::BudgetError),

    #[error("gateway error: {0}")]
    Gateway(#[from] helm_gateway::GatewayError),

    #[error("ledger error: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] helm_sandbox::SandboxError),
}
