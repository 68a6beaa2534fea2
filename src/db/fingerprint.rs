//! Cache keys for pooled connections.

use crate::config::ConnectionConfig;
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 (lowercase hex) over `database ++ username ++ password`.
///
/// Host and port are not part of the digest: two configurations that reach
/// the same database with the same credentials share one connection, even
/// through different hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionFingerprint(String);

impl ConnectionFingerprint {
    pub fn of(config: &ConnectionConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(config.database());
        hasher.update(config.username());
        hasher.update(config.password());
        ConnectionFingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
