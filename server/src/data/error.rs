//! Unified error type for the storage layer

use thiserror::Error;

/// Error from a metric store backend.
#[derive(Error, Debug)]
pub enum DataError {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    /// Record payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    pub fn from_sqlite(e: sqlx::Error) -> Self {
        Self::Sqlite(e)
    }

    /// Whether retrying the operation might succeed. Lock contention and
    /// pool trouble clear up; a corrupt payload or bad config does not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Database(_)
            ),
            Self::Io(_) => true,
            Self::Serialization(_) | Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DataError::Config("unknown backend 'mysql'".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown backend 'mysql'"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = DataError::from_sqlite(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }

    #[test]
    fn test_serialization_error_is_permanent() {
        let parse = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = DataError::from(parse);
        assert!(!err.is_transient());
    }
}
