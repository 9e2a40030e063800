use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("work order error: {0}")]
    Wo(#[from] helm_types::WoError),

    #[error("work order rule error: {0}")]
    WorkOrder(#[from] helm_workorder::WorkOrderError),

    #[error("budget error: {0}")]
    Budget(#[from] helm_budget::BudgetError),

    #[error("gateway error: {0}")]
    Gateway(#[from] helm_gateway::GatewayError),

    #[error("attention error: {0}")]
    Attention(#[from] helm_attention::AttentionError),

    #[error("ledger error: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),

    #[error("no prompt contract registered for {0}")]
    ContractNotFound(String),

    #[error("no tool registered for {0}")]
    ToolNotFound(String),
}
