//! sqlx-backed server connector.

use super::{QueryOutcome, ServerConnector, ServerSession, ADMIN_DATABASE};
use crate::config::ConnectionConfig;
use crate::error::DbError;
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{ConnectOptions, Connection, Executor};

/// Connects to the administrative database of the configured server.
#[derive(Debug, Clone, Default)]
pub struct PgServerConnector;

impl PgServerConnector {
    pub fn new() -> Self {
        PgServerConnector
    }
}

#[async_trait]
impl ServerConnector for PgServerConnector {
    async fn connect_to_server(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Box<dyn ServerSession>, DbError> {
        let conn = config
            .connect_options(ADMIN_DATABASE)
            .connect()
            .await
            .map_err(DbError::connection)?;
        Ok(Box::new(PgServerSession { conn }))
    }
}

struct PgServerSession {
    conn: PgConnection,
}

#[async_trait]
impl ServerSession for PgServerSession {
    async fn send_query(&mut self, sql: &str) -> Result<QueryOutcome, DbError> {
        // A bare &str goes over the simple query protocol, which CREATE DATABASE needs.
        let rows = (&mut self.conn)
            .fetch_all(sql)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        Ok(QueryOutcome {
            row_count: rows.len() as u64,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().await.map_err(DbError::connection)
    }
}
