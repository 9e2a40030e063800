mod error;
mod index;
mod query;
mod request;

pub use error::QueryError;
pub use index::TierIndex;
pub use query::{AggregationResult, LedgerQuery, QueryResult};
pub use request::{Aggregation, QueryRequest, Recency, SortOrder};
