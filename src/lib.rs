pub mod config;
pub mod db;
pub mod error;
pub mod provision;
pub mod setup;

pub use config::{ConfigError, ConnectionConfig};
pub use db::{
    close_all, ConnectionFactory, ConnectionFingerprint, ConnectionRegistry, Connector, PgConnector,
};
pub use error::DbError;
pub use provision::{
    DatabaseManager, MockServerConnector, PgServerConnector, ProvisionOutcome, ServerConnector,
    ServerSession,
};
