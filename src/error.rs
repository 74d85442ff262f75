//! Error types for the database abstraction core.
//!
//! This module defines all error types using `thiserror`. Schema-model
//! mutations fail with [`DbError::Validation`] before any SQL is built,
//! introspection failures are wrapped into [`DbError::Introspection`] with the
//! original cause attached, and driver errors are classified on conversion.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Validation failed: {message} (object: {object})")]
    Validation { message: String, object: String },

    #[error("Introspection failed: {message} (table: {object})")]
    Introspection {
        message: String,
        object: String,
        #[source]
        source: Option<Box<DbError>>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a validation error for a rejected schema-model mutation.
    pub fn validation(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an introspection error without an underlying cause.
    pub fn introspection(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Introspection {
            message: message.into(),
            object: object.into(),
            source: None,
        }
    }

    /// Wrap a failed metadata query into an introspection error.
    pub fn introspection_caused_by(
        message: impl Into<String>,
        object: impl Into<String>,
        cause: DbError,
    ) -> Self {
        Self::Introspection {
            message: message.into(),
            object: object.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Introspection {
                source: Some(cause),
                ..
            } => cause.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// The original cause of an introspection failure, if any.
    pub fn cause(&self) -> Option<&DbError> {
        match self {
            Self::Introspection { source, .. } => source.as_deref(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found in result: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_validation_display() {
        let err = DbError::validation("Unknown column 'nope'", "articles");
        assert_eq!(
            err.to_string(),
            "Validation failed: Unknown column 'nope' (object: articles)"
        );
    }

    #[test]
    fn test_introspection_keeps_cause() {
        let cause = DbError::database("relation does not exist", Some("42P01".into()), "x");
        let err = DbError::introspection_caused_by("cannot describe", "articles", cause);

        assert!(err.to_string().contains("articles"));
        assert!(err.source().is_some());
        assert!(matches!(err.cause(), Some(DbError::Database { .. })));
        assert_eq!(err.suggestion(), Some("x"));
    }

    #[test]
    fn test_introspection_without_cause() {
        let err = DbError::introspection("cannot describe articles. It has 0 columns.", "articles");
        assert!(err.source().is_none());
        assert!(err.cause().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::validation("bad", "t").is_retryable());
    }
}
