//! History store error types.

use thiserror::Error;

/// Format the failing statement for display, collapsing whitespace so
/// multi-line SQL stays on one log line.
fn format_statement(statement: &Option<&'static str>) -> String {
    match statement {
        Some(sql) => {
            let compact = sql.split_whitespace().collect::<Vec<_>>().join(" ");
            format!(" in `{compact}`")
        }
        None => String::new(),
    }
}

/// History store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The stored data contradicts an invariant, or an operation would
    /// break one (e.g. deleting a property definition still in use).
    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("persistence error{}: {source}", format_statement(.statement))]
    Persistence {
        statement: Option<&'static str>,
        #[source]
        source: sqlx::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for history store operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl From<sqlx::Error> for MetadataError {
    fn from(source: sqlx::Error) -> Self {
        Self::Persistence {
            statement: None,
            source,
        }
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<quire_core::Error> for MetadataError {
    fn from(e: quire_core::Error) -> Self {
        match e {
            quire_core::Error::UnknownMapping(_) | quire_core::Error::UnknownState(_) => {
                Self::Consistency(e.to_string())
            }
            quire_core::Error::InvalidConfig(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Attach the failing SQL statement to a `sqlx` error.
pub(crate) trait StatementContext<T> {
    fn stmt(self, sql: &'static str) -> MetadataResult<T>;
}

impl<T> StatementContext<T> for std::result::Result<T, sqlx::Error> {
    fn stmt(self, sql: &'static str) -> MetadataResult<T> {
        self.map_err(|source| MetadataError::Persistence {
            statement: Some(sql),
            source,
        })
    }
}
