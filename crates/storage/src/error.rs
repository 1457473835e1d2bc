use autoindex_core::Error as CoreError;
use thiserror::Error;

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Classify a sqlx error, attaching the operation that failed
    pub(crate) fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::UniqueViolation(format!("{context}: {db_err}"))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::ConnectionFailed(format!("{context}: {err}"))
            }
            _ => Self::BackendError(format!("{context}: {err}")),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation(msg) => CoreError::conflict(msg),
            other => CoreError::storage(other.to_string()),
        }
    }
}

/// Shorthand for mapping a sqlx error straight into the core error type
pub(crate) fn sqlx_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |err| StorageError::from_sqlx(context, err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err: CoreError = StorageError::UniqueViolation("insert index".to_string()).into();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_pool_timeout_is_connection_failure() {
        let err = StorageError::from_sqlx("begin transaction", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StorageError::ConnectionFailed(_)));

        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::Storage(_)));
    }
}
