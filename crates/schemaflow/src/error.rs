//! Error types for the migration engine.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, bad identifiers).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two change set definitions resolved to the same identity.
    #[error("Duplicate change set identity: {identity}")]
    DuplicateIdentity { identity: String },

    /// A change set definition could not be parsed into valid change units.
    #[error("Malformed change set definition {identity}: {reason}")]
    MalformedDefinition { identity: String, reason: String },

    /// No dialect registered under the requested name.
    #[error("Unknown database dialect: {0}")]
    UnknownDialect(String),

    /// The active dialect cannot express a change unit kind.
    #[error("Dialect {dialect} does not support operation: {operation}")]
    UnsupportedOperation {
        dialect: String,
        operation: &'static str,
    },

    /// Another migration run holds the exclusive run lock.
    #[error("Migration run lock '{lock_name}' is held by another run")]
    LockUnavailable { lock_name: String },

    /// The ledger bookkeeping table does not match the expected shape.
    #[error("Ledger corrupt: {0}")]
    LedgerCorrupt(String),

    /// An identity was recorded twice (race not caught by the run lock).
    #[error("Change set {identity} is already recorded in the ledger")]
    DuplicateApplication { identity: String },

    /// An already-applied change set's authored content changed after it ran.
    #[error(
        "Drift detected for applied change set {identity}: \
         ledger checksum {recorded} does not match current checksum {current}"
    )]
    DriftDetected {
        identity: String,
        recorded: String,
        current: String,
    },

    /// A statement failed while executing a change set.
    #[error(
        "Statement failed for change set {identity} (ordinal {ordinal}): {message}\n  SQL: {sql}"
    )]
    Statement {
        identity: String,
        ordinal: i64,
        sql: String,
        message: String,
    },

    /// Error surfaced by the underlying database connection.
    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Wrap a driver-level error from a [`Connection`](crate::connection::Connection)
    /// implementation.
    pub fn database<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MigrateError::Database(Box::new(err))
    }

    /// Create a Statement error with full execution context.
    pub fn statement(
        identity: impl Into<String>,
        ordinal: i64,
        sql: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Statement {
            identity: identity.into(),
            ordinal,
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// True for failures that abort before any database mutation.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            MigrateError::DuplicateIdentity { .. }
                | MigrateError::MalformedDefinition { .. }
                | MigrateError::UnknownDialect(_)
                | MigrateError::LockUnavailable { .. }
                | MigrateError::DriftDetected { .. }
                | MigrateError::Config(_)
        )
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_carries_context() {
        let err = MigrateError::statement("app/AddWidgets", 3, "CREATE TABLE x ()", "boom");
        let msg = err.to_string();
        assert!(msg.contains("app/AddWidgets"));
        assert!(msg.contains("ordinal 3"));
        assert!(msg.contains("CREATE TABLE x ()"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = MigrateError::database(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Database error"));
        assert!(detailed.contains("Caused by"));
        assert!(detailed.contains("disk on fire"));
    }

    #[test]
    fn test_pre_execution_classification() {
        assert!(MigrateError::LockUnavailable {
            lock_name: "x".into()
        }
        .is_pre_execution());
        assert!(!MigrateError::statement("id", 1, "sql", "msg").is_pre_execution());
    }
}
