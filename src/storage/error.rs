use thiserror::Error;

/// Store errors. Any of them coming out of a write means the destination
/// can no longer be trusted, so workers treat them as fatal. Problems with
/// individual documents are reported through [`super::WriteOutcome`] instead.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query execution error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid collection name: '{0}'")]
    InvalidCollection(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Store session is closed")]
    SessionClosed,

    /// Invalid data format in database
    #[error("Invalid stored document {key} in {collection}: {message}")]
    InvalidStoredDocument {
        collection: String,
        key: String,
        message: String,
    },

    /// Generic storage operation error with context
    #[error("Storage operation failed: {operation} - {details}")]
    OperationFailed { operation: String, details: String },
}

impl StoreError {
    pub fn operation_failed(operation: &str, details: impl ToString) -> Self {
        StoreError::OperationFailed {
            operation: operation.to_string(),
            details: details.to_string(),
        }
    }
}
