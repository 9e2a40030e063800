use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] helm_ledger::LedgerError),

    #[error("query error: {0}")]
    Query(#[from] helm_query::QueryError),

    #[error("package error: {0}")]
    Package(#[from] helm_package::PackageError),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Exit code conventions per the install pipeline's own classification:
    /// 1 validation, 2 integrity, 3 I/O, 0 otherwise unused (success never
    /// reaches here).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Package(helm_package::PackageError::Validation(_)) => 1,
            CliError::Package(helm_package::PackageError::Integrity(_)) => 2,
            CliError::Package(helm_package::PackageError::Io(_)) | CliError::Io(_) => 3,
            _ => 1,
        }
    }
}
