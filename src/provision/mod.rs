//! Database provisioning: make sure the configured database exists before
//! anything connects to it.
//!
//! Provisioning talks to the server's administrative database, since the
//! target may not exist yet. Each call to
//! [`DatabaseManager::recreate_database`] opens its own server session, runs
//! the existence check and (if needed) the creation statement, and closes the
//! session again.

use crate::config::ConnectionConfig;
use crate::error::DbError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod mock;
pub mod postgres;

pub use mock::{MockEvent, MockServerConnector};
pub use postgres::PgServerConnector;

/// Database every PostgreSQL server ships with.
pub const ADMIN_DATABASE: &str = "postgres";

/// Raw result of a statement sent over a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOutcome {
    pub row_count: u64,
}

/// An open connection to the administrative database.
#[async_trait]
pub trait ServerSession: Send {
    /// Send one statement and return the raw outcome or the driver error.
    async fn send_query(&mut self, sql: &str) -> Result<QueryOutcome, DbError>;

    async fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Opens server sessions. Implementations must either return a fully open
/// session or an error, never a half-open handle.
#[async_trait]
pub trait ServerConnector: Send + Sync + fmt::Debug {
    async fn connect_to_server(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn ServerSession>, DbError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyExists,
    Created,
}

#[derive(Debug, Clone)]
pub struct DatabaseManager {
    connector: Arc<dyn ServerConnector>,
    config: ConnectionConfig,
}

impl DatabaseManager {
    pub fn new(connector: Arc<dyn ServerConnector>, config: ConnectionConfig) -> Self {
        Self { connector, config }
    }

    pub fn postgres(config: ConnectionConfig) -> Self {
        Self::new(Arc::new(PgServerConnector::new()), config)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Create the configured database unless it already exists.
    ///
    /// A connect failure is returned before any statement is sent. Once
    /// connected, the session is closed whether or not the statements
    /// succeed. A failure to close after a successful run is logged, not
    /// returned.
    pub async fn recreate_database(&self) -> Result<ProvisionOutcome, DbError> {
        let mut session = self.connector.connect_to_server(&self.config).await?;
        debug!(
            host = self.config.host(),
            port = self.config.port(),
            "connected to administrative database"
        );

        let result = self.ensure_database(session.as_mut()).await;

        match (session.close().await, &result) {
            (Err(close_err), Ok(_)) => {
                warn!("failed to close server connection: {}", close_err);
            }
            (Err(close_err), Err(_)) => {
                debug!("failed to close server connection after error: {}", close_err);
            }
            (Ok(()), _) => {}
        }

        result
    }

    async fn ensure_database(
        &self,
        session: &mut dyn ServerSession,
    ) -> Result<ProvisionOutcome, DbError> {
        if self.has_database(session).await? {
            info!("database '{}' already exists", self.config.database());
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        self.create_database(session).await
    }

    /// `true` when the server catalog lists the configured database.
    pub async fn has_database(&self, session: &mut dyn ServerSession) -> Result<bool, DbError> {
        let outcome = session.send_query(&self.existence_query()).await?;
        Ok(outcome.row_count > 0)
    }

    /// Issue `CREATE DATABASE`. If another session created it first, the
    /// duplicate error counts as success and `AlreadyExists` is returned.
    pub async fn create_database(
        &self,
        session: &mut dyn ServerSession,
    ) -> Result<ProvisionOutcome, DbError> {
        match session.send_query(&self.creation_statement()).await {
            Ok(_) => {
                info!("database '{}' created", self.config.database());
                Ok(ProvisionOutcome::Created)
            }
            Err(err) if err.is_duplicate_database() => {
                info!(
                    "database '{}' was created concurrently",
                    self.config.database()
                );
                Ok(ProvisionOutcome::AlreadyExists)
            }
            Err(err) => Err(err),
        }
    }

    pub fn existence_query(&self) -> String {
        format!(
            "SELECT 1 FROM pg_database WHERE datname='{}'",
            self.config.database()
        )
    }

    pub fn creation_statement(&self) -> String {
        format!("CREATE DATABASE {}", self.config.database())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_config() -> ConnectionConfig {
        ConnectionConfig::new("localhost", "5432", "app_test", "u", "p").unwrap()
    }

    fn manager(mock: &MockServerConnector) -> DatabaseManager {
        DatabaseManager::new(Arc::new(mock.clone()), literal_config())
    }

    #[test]
    fn test_statement_shapes() {
        let manager = manager(&MockServerConnector::new());
        assert_eq!(
            manager.existence_query(),
            "SELECT 1 FROM pg_database WHERE datname='app_test'"
        );
        assert_eq!(manager.creation_statement(), "CREATE DATABASE app_test");
    }

    #[tokio::test]
    async fn test_missing_database_is_created() {
        let mock = MockServerConnector::new();
        let outcome = manager(&mock).recreate_database().await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::Created);
        assert_eq!(
            mock.events(),
            vec![
                MockEvent::Connected {
                    database: ADMIN_DATABASE.to_string()
                },
                MockEvent::Query("SELECT 1 FROM pg_database WHERE datname='app_test'".to_string()),
                MockEvent::Query("CREATE DATABASE app_test".to_string()),
                MockEvent::Closed,
            ]
        );
        assert!(mock.has_database("app_test"));
    }

    #[tokio::test]
    async fn test_existing_database_is_left_alone() {
        let mock = MockServerConnector::new().with_database("app_test");
        let outcome = manager(&mock).recreate_database().await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
        assert_eq!(
            mock.queries(),
            vec!["SELECT 1 FROM pg_database WHERE datname='app_test'".to_string()]
        );
        assert!(mock.is_closed());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let mock = MockServerConnector::new();
        let manager = manager(&mock);
        assert_eq!(
            manager.recreate_database().await.unwrap(),
            ProvisionOutcome::Created
        );
        assert_eq!(
            manager.recreate_database().await.unwrap(),
            ProvisionOutcome::AlreadyExists
        );
        assert_eq!(mock.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_connect_failure_sends_no_queries() {
        let mock = MockServerConnector::new().with_connect_error("connection refused");
        let err = manager(&mock).recreate_database().await.unwrap_err();

        match err {
            DbError::Connection { message, .. } => assert!(message.contains("connection refused")),
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert!(mock.queries().is_empty());
        assert!(mock.events().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_still_closes() {
        let mock = MockServerConnector::new().with_query_error("SELECT", "42501");
        let err = manager(&mock).recreate_database().await.unwrap_err();

        match &err {
            DbError::Query { code, .. } => assert_eq!(code.as_deref(), Some("42501")),
            other => panic!("Expected Query error, got {:?}", other),
        }
        assert!(mock.is_closed());
        assert_eq!(mock.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_is_propagated() {
        let mock = MockServerConnector::new().with_query_error("CREATE", "42501");
        let err = manager(&mock).recreate_database().await.unwrap_err();

        assert!(matches!(err, DbError::Query { .. }));
        assert!(!err.is_duplicate_database());
        assert!(mock.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_create_counts_as_existing() {
        // The catalog check misses a database another session just created.
        let mock = MockServerConnector::new()
            .with_database("app_test")
            .with_stale_catalog();
        let outcome = manager(&mock).recreate_database().await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
        assert_eq!(mock.queries().len(), 2);
        assert!(mock.is_closed());
    }

    #[tokio::test]
    async fn test_close_failure_after_success_is_not_an_error() {
        let mock = MockServerConnector::new().with_close_error("socket reset");
        let outcome = manager(&mock).recreate_database().await.unwrap();
        assert_eq!(outcome, ProvisionOutcome::Created);
    }
}
