//! In-memory server connector for exercising provisioning without a server.

use super::{QueryOutcome, ServerConnector, ServerSession, ADMIN_DATABASE};
use crate::config::ConnectionConfig;
use crate::error::DbError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

const EXISTENCE_PREFIX: &str = "SELECT 1 FROM pg_database WHERE datname='";
const CREATE_PREFIX: &str = "CREATE DATABASE ";

/// Something a mock session observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connected { database: String },
    Query(String),
    Closed,
}

#[derive(Debug, Default)]
struct MockState {
    databases: BTreeSet<String>,
    events: Vec<MockEvent>,
}

#[derive(Debug, Clone)]
struct QueryFailure {
    prefix: String,
    code: String,
}

/// Mock connector whose sessions answer the provisioning statements from a
/// shared set of database names and record every call.
///
/// Clones share state, so a test can keep one clone for assertions and hand
/// another to a [`DatabaseManager`](super::DatabaseManager).
#[derive(Debug, Clone, Default)]
pub struct MockServerConnector {
    state: Arc<Mutex<MockState>>,
    connect_error: Option<String>,
    close_error: Option<String>,
    query_failure: Option<QueryFailure>,
    stale_catalog: bool,
}

impl MockServerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `name` already present on the server.
    pub fn with_database(self, name: &str) -> Self {
        self.lock().databases.insert(name.to_string());
        self
    }

    /// Refuse every connection attempt.
    pub fn with_connect_error(mut self, message: &str) -> Self {
        self.connect_error = Some(message.to_string());
        self
    }

    /// Fail statements starting with `prefix` with SQLSTATE `code`.
    pub fn with_query_error(mut self, prefix: &str, code: &str) -> Self {
        self.query_failure = Some(QueryFailure {
            prefix: prefix.to_string(),
            code: code.to_string(),
        });
        self
    }

    pub fn with_close_error(mut self, message: &str) -> Self {
        self.close_error = Some(message.to_string());
        self
    }

    /// Make existence checks always report "missing", as if another session
    /// created the database right after the check.
    pub fn with_stale_catalog(mut self) -> Self {
        self.stale_catalog = true;
        self
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Query(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// `true` when the last recorded event is a close.
    pub fn is_closed(&self) -> bool {
        matches!(self.lock().events.last(), Some(MockEvent::Closed))
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.lock().databases.contains(name)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ServerConnector for MockServerConnector {
    async fn connect_to_server(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn ServerSession>, DbError> {
        if let Some(message) = &self.connect_error {
            return Err(DbError::Connection {
                message: message.clone(),
                source: None,
            });
        }
        self.lock().events.push(MockEvent::Connected {
            database: ADMIN_DATABASE.to_string(),
        });
        Ok(Box::new(MockSession {
            connector: self.clone(),
        }))
    }
}

struct MockSession {
    connector: MockServerConnector,
}

impl MockSession {
    fn reject(sql: &str, code: &str, message: &str) -> DbError {
        DbError::Query {
            sql: sql.to_string(),
            code: Some(code.to_string()),
            message: message.to_string(),
            source: None,
        }
    }
}

#[async_trait]
impl ServerSession for MockSession {
    async fn send_query(&mut self, sql: &str) -> Result<QueryOutcome, DbError> {
        let mut state = self.connector.lock();
        state.events.push(MockEvent::Query(sql.to_string()));

        if let Some(failure) = &self.connector.query_failure {
            if sql.starts_with(&failure.prefix) {
                return Err(Self::reject(sql, &failure.code, "mock query failure"));
            }
        }

        if let Some(rest) = sql.strip_prefix(EXISTENCE_PREFIX) {
            let name = rest.trim_end_matches('\'');
            let exists = !self.connector.stale_catalog && state.databases.contains(name);
            return Ok(QueryOutcome {
                row_count: u64::from(exists),
            });
        }

        if let Some(name) = sql.strip_prefix(CREATE_PREFIX) {
            if !state.databases.insert(name.to_string()) {
                return Err(Self::reject(
                    sql,
                    "42P04",
                    &format!("database \"{}\" already exists", name),
                ));
            }
            return Ok(QueryOutcome::default());
        }

        Err(Self::reject(sql, "42601", "syntax error"))
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.connector.lock().events.push(MockEvent::Closed);
        match &self.connector.close_error {
            Some(message) => Err(DbError::Connection {
                message: message.clone(),
                source: None,
            }),
            None => Ok(()),
        }
    }
}
