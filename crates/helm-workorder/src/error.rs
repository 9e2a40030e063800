use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkOrderError {
    #[error(transparent)]
    Wo(#[from] helm_types::WoError),

    #[error(transparent)]
    Budget(#[from] helm_budget::BudgetError),

    #[error("output failed schema validation: {0}")]
    OutputInvalid(#[from] helm_schema::SchemaError),

    #[error("tool {tool} is not in the work order's tools_allowed list")]
    ToolNotAllowed { tool: String },

    #[error("turn limit {limit} exceeded ({used} turns used)")]
    TurnLimitExceeded { limit: u32, used: u32 },
}
