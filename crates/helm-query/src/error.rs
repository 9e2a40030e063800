use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown tier ledger requested: {0:?}")]
    UnknownTier(helm_types::Tier),

    #[error("limit {requested} exceeds max_page_size {max}")]
    LimitExceedsPageSize { requested: usize, max: usize },

    #[error("unparseable time expression: {0}")]
    BadTimeExpression(String),

    #[error("ledger read failed: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),
}
