use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("work order error: {0}")]
    Wo(#[from] helm_types::WoError),

    #[error("work order rule error: {0}")]
    WorkOrder(#[from] helm_workorder::WorkOrderError),

    #[error("executor error: {0}")]
    Executor(#[from] helm_executor::ExecutorError),

    #[error("budget error: {0}")]
    Budget(#[from] helm_budget::BudgetError),

    #[error("ledger error: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),

    #[error("query error: {0}")]
    Query(#[from] helm_query::QueryError),

    #[error("gateway error: {0}")]
    Gateway(#[from] helm_gateway::GatewayError),
}
