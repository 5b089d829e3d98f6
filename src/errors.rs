use thiserror::Error;

/// Custom error type for every station console operation.
#[derive(Error, Debug)]
pub enum DbError {
    /// Bad credentials, or a role not allowed to perform the operation.
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Table or column lookup failed (missing table, missing privilege).
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Table `{0}` has no primary key; rows cannot be updated or deleted safely")]
    NoPrimaryKey(String),
    #[error("Table `{0}` has no insertable columns")]
    NoInsertableColumns(String),
    #[error("Table `{0}` has no editable columns")]
    NoUpdatableColumns(String),
    /// A displayed row does not line up with the table's live column order.
    #[error("Alignment error: {0}")]
    Alignment(String),
    /// Client-side type check failed before anything was sent.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Forbidden statement: {0}")]
    ForbiddenStatement(String),
    /// Error that occurs during database interactions (e.g., SQL query failure).
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    /// Transaction error (e.g., failed to commit or rollback a transaction).
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// Connection error (e.g., issues with network or database connection).
    #[error("Connection error: {0}")]
    Connection(String),
    /// Configuration error (e.g., invalid port or unreadable config file).
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Export error: {0}")]
    Export(String),
}

impl DbError {
    /// Classifies a failure to open a connection.
    pub fn from_connect(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some("28000") => {
                DbError::Auth(db_error.message().to_string())
            }
            _ => DbError::Connection(error.to_string()),
        }
    }

    /// True for failures that leave the form editable (nothing reached the database).
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            DbError::Validation(_)
                | DbError::NoUpdatableColumns(_)
                | DbError::NoInsertableColumns(_)
                | DbError::Auth(_)
        )
    }
}
