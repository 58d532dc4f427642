//! Error types for the export and replay library.

use thiserror::Error;

/// Main error type for export, replay and dump operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not reach the database; aborts the whole operation.
    #[error("Connection failed ({context}): {message}")]
    Connection { context: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A catalog query for a single table or sequence failed.
    #[error("Catalog query failed for {entity}: {message}")]
    CatalogQuery { entity: String, message: String },

    /// A descriptor cannot be rendered as valid DDL.
    #[error("Invalid definition for table {table}: {message}")]
    Validation { table: String, message: String },

    /// A replayed statement failed and its script was rolled back.
    #[error("Statement #{ordinal} of {script} failed: {message}\n  Statement: {preview}")]
    Statement {
        script: String,
        ordinal: usize,
        preview: String,
        message: String,
    },

    /// An external dump/restore process failed.
    #[error("{stage} failed: {message}")]
    Process { stage: String, message: String },

    /// PostgreSQL protocol or query error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a CatalogQuery error for one table or sequence
    pub fn catalog(entity: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::CatalogQuery {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    /// Create a Validation error
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Validation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Process error
    pub fn process(stage: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Process {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// True for a failure scoped to one table or sequence. Everything else,
    /// including a lost connection, aborts an export.
    pub fn is_per_entity(&self) -> bool {
        matches!(self, MigrateError::CatalogQuery { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => 3,
            MigrateError::Statement { .. } => 4,
            MigrateError::Process { .. } => 5,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
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
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::connection("refused", "source").exit_code(), 3);
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
        assert_eq!(MigrateError::catalog("users", "boom").exit_code(), 1);
    }

    #[test]
    fn test_only_catalog_queries_are_per_entity() {
        assert!(MigrateError::catalog("users", "boom").is_per_entity());
        assert!(!MigrateError::pool("connection closed", "load_columns").is_per_entity());
        assert!(!MigrateError::connection("reset", "source").is_per_entity());
        assert!(!MigrateError::Cancelled.is_per_entity());
    }

    #[test]
    fn test_statement_error_mentions_position() {
        let err = MigrateError::Statement {
            script: "03_data.sql".into(),
            ordinal: 2,
            preview: "INSERT INTO t VALUES (1)".into(),
            message: "duplicate key".into(),
        };
        let text = err.format_detailed();
        assert!(text.contains("Statement #2 of 03_data.sql"));
        assert!(text.contains("INSERT INTO t VALUES (1)"));
    }
}
