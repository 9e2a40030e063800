use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttentionError {
    #[error("multiple attention templates match at the same specificity for agent_class={agent_class:?} framework_id={framework_id:?} tier={tier:?}")]
    AmbiguousTemplateMatch {
        agent_class: Option<String>,
        framework_id: Option<String>,
        tier: String,
    },

    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("no custom stage handler registered for stage {0}")]
    NoCustomHandler(String),

    #[error("budget exhausted before stage {0} could run")]
    BudgetExhausted(String),

    #[error("registry read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger query failed: {0}")]
    Query(#[from] helm_query::QueryError),

    #[error("bad stage config for {stage}: {reason}")]
    BadStageConfig { stage: String, reason: String },
}
