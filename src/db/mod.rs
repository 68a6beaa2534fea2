//! Connection caching for PostgreSQL.
//!
//! This module provides:
//! - Connection fingerprints (cache keys)
//! - The connection registry
//! - The connection factory and its PostgreSQL connector

pub mod factory;
pub mod fingerprint;
pub mod registry;

pub use factory::{close_all, ConnectionFactory, Connector, PgConnector};
pub use fingerprint::ConnectionFingerprint;
pub use registry::ConnectionRegistry;
