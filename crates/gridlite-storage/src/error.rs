use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Parse(#[from] gridlite_expr::ParseError),
    #[error(transparent)]
    Model(#[from] gridlite_model::ModelError),
    #[error("unresolved formula dependencies in table '{table}': {}", .columns.join(", "))]
    Dependency { table: String, columns: Vec<String> },
    #[error("unsupported catalog schema version: {0}")]
    SchemaVersion(i64),
    #[error("invalid or empty document: no tables registered")]
    EmptyDocument,
    #[error("{context}: expected to affect 1 row, affected {affected}")]
    ConstraintViolation {
        context: &'static str,
        affected: usize,
    },
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },
    #[error("cannot determine SQL source of view '{0}'")]
    ViewSource(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Guard for catalog statements that must touch exactly one row.
pub(crate) fn expect_one(affected: usize, context: &'static str) -> Result<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StorageError::ConstraintViolation { context, affected })
    }
}
