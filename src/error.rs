use crate::config::ConfigError;
use thiserror::Error;

/// SQLSTATE `duplicate_database`.
const DUPLICATE_DATABASE: &str = "42P04";
/// SQLSTATE `unique_violation`; raised by the `pg_database` name index when two
/// sessions create the same database at once.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },
    #[error("Query error ({}) for `{sql}`: {message}", .code.as_deref().unwrap_or("no code"))]
    Query {
        sql: String,
        code: Option<String>,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },
    #[error("No Tokio runtime available to drive the connection pool")]
    NoRuntime,
}

impl DbError {
    pub fn connection(err: sqlx::Error) -> Self {
        DbError::Connection {
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn query(sql: &str, err: sqlx::Error) -> Self {
        let code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|c| c.into_owned());
        DbError::Query {
            sql: sql.to_string(),
            code,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// The server refused a `CREATE DATABASE` because the name is taken.
    pub fn is_duplicate_database(&self) -> bool {
        match self {
            DbError::Query {
                code: Some(code), ..
            } => code == DUPLICATE_DATABASE || code == UNIQUE_VIOLATION,
            _ => false,
        }
    }
}
