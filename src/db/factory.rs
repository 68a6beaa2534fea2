//! Connection factory: one live connection per fingerprint.

use super::fingerprint::ConnectionFingerprint;
use super::registry::ConnectionRegistry;
use crate::config::ConnectionConfig;
use crate::error::DbError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Default maximum connections for each cached pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Builds a connection handle from a configuration.
///
/// Construction must not touch the network; server failures surface when
/// the handle is first used. An error here means the handle could not be
/// built at all.
pub trait Connector: Send + Sync {
    type Connection: Send + Sync;

    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, DbError>;
}

/// Lazily connecting PostgreSQL pools with statement logging turned off.
///
/// Pools spawn their maintenance tasks on a Tokio runtime. Without an
/// explicit [`with_runtime`](Self::with_runtime) handle, the caller's
/// ambient runtime is used, and calling from outside any runtime yields
/// [`DbError::NoRuntime`].
#[derive(Debug, Clone)]
pub struct PgConnector {
    max_connections: u32,
    runtime: Option<Handle>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            runtime: None,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Build pools on `handle` instead of the caller's runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    fn runtime_handle(&self) -> Result<Handle, DbError> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| DbError::NoRuntime),
        }
    }
}

impl Default for PgConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for PgConnector {
    type Connection = PgPool;

    fn connect(&self, config: &ConnectionConfig) -> Result<PgPool, DbError> {
        let handle = self.runtime_handle()?;
        let _runtime = handle.enter();

        let options = config
            .connect_options(config.database())
            .disable_statement_logging();
        Ok(PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect_lazy_with(options))
    }
}

pub struct ConnectionFactory<K: Connector = PgConnector> {
    connector: K,
    registry: Arc<ConnectionRegistry<K::Connection>>,
}

impl<K: Connector> ConnectionFactory<K> {
    pub fn new(connector: K, registry: Arc<ConnectionRegistry<K::Connection>>) -> Self {
        Self {
            connector,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry<K::Connection>> {
        &self.registry
    }

    pub fn fingerprint(&self, config: &ConnectionConfig) -> ConnectionFingerprint {
        ConnectionFingerprint::of(config)
    }

    /// Return the cached connection for `config`'s fingerprint, creating and
    /// caching one on first request.
    ///
    /// A cached handle is returned as-is, even when `config` names a
    /// different host or port than the one it was built from. When the
    /// connector fails, nothing is cached and the next call tries again.
    pub fn get_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<K::Connection>, DbError> {
        let fingerprint = self.fingerprint(config);
        let (connection, created) = self
            .registry
            .get_or_try_insert_with(fingerprint.clone(), || self.connector.connect(config))?;

        if created {
            debug!(
                database = config.database(),
                host = config.host(),
                "postgres connection to database '{}' established",
                config.database()
            );
        } else {
            trace!(%fingerprint, "reusing cached connection");
        }
        Ok(connection)
    }
}

impl ConnectionFactory<PgConnector> {
    /// Factory over a fresh registry with default PostgreSQL settings.
    pub fn postgres() -> Self {
        Self::new(PgConnector::new(), Arc::new(ConnectionRegistry::new()))
    }
}

/// Drain `registry` and close every pool in it.
///
/// Handles still held by callers are closed as well; later queries on them fail.
pub async fn close_all(registry: &ConnectionRegistry<PgPool>) -> usize {
    let drained = registry.drain();
    let count = drained.len();
    for (fingerprint, pool) in drained {
        trace!(%fingerprint, "closing pool");
        pool.close().await;
    }
    debug!("closed {} cached connection(s)", count);
    count
}
