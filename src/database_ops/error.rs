use thiserror::Error;

/// Every failure a catalog invocation can surface.
///
/// Each variant carries enough context (statement, target id or type, cause) to
/// diagnose the failure from the message alone. Nothing here is retried.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("connection to {target} failed: {source}")]
    Connection {
        /// Redacted DSN of the database we tried to reach.
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement {statement} ({params}) failed: {source}")]
    Query {
        statement: &'static str,
        /// Parameter summary with free-text values redacted.
        params: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement {statement}: no product with id {id}")]
    NotFound { statement: &'static str, id: i64 },

    #[error("update of product {id} matched {affected} rows; id is no longer unique")]
    AmbiguousUpdate { id: i64, affected: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CatalogError {
    /// Process exit code used by the binaries.
    pub fn exit_code(&self) -> i32 {
        match self {
            CatalogError::Connection { .. } => 2,
            CatalogError::NotFound { .. } => 3,
            CatalogError::AmbiguousUpdate { .. } => 4,
            CatalogError::InvalidArgument(_) => 5,
            CatalogError::Query { .. } => 1,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
