use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LEN: usize = 63;

/// Keywords the PostgreSQL grammar does not accept as a bare database name
/// (the reserved and type/function-name categories).
const RESERVED_KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant", "group",
    "having", "ilike", "in", "initially", "inner", "intersect", "into", "is", "isnull", "join",
    "lateral", "leading", "left", "like", "limit", "localtime", "localtimestamp", "natural",
    "not", "notnull", "null", "offset", "on", "only", "or", "order", "outer", "overlaps",
    "placing", "primary", "references", "returning", "right", "select", "session_user",
    "similar", "some", "symmetric", "system_user", "table", "tablesample", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "verbose", "when",
    "where", "window", "with",
];

/// Connection settings for a PostgreSQL database.
///
/// Only constructible through the validating constructors. Every field is
/// present; username and password may be empty (trust/peer authentication).
/// The database name is a lowercase, non-reserved identifier, so PostgreSQL
/// reads it unquoted exactly as written and it can be spliced into
/// provisioning SQL.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {0}")]
    MissingField(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// The property-bag shape accepted by [`ConnectionConfig::from_json`].
#[derive(Debug, Deserialize)]
struct RawConnectionConfig {
    host: Option<String>,
    port: Option<String>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: impl AsRef<str>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let host = non_empty("host", host.into())?;
        let port = parse_port(port.as_ref())?;
        let database = validate_database_name(non_empty("database", database.into())?)?;
        let username = username.into();
        let password = password.into();

        Ok(ConnectionConfig {
            host,
            port,
            database,
            username,
            password,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    /// Read `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_DATABASE`,
    /// `POSTGRES_USERNAME` and `POSTGRES_PASSWORD` from the given map.
    ///
    /// Errors name the configuration field (`password`), not the variable.
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |field: &str| {
            env_map
                .get(&format!("POSTGRES_{}", field.to_uppercase()))
                .cloned()
                .ok_or_else(|| ConfigError::MissingField(field.to_string()))
        };

        let host = get("host")?;
        let port = get("port")?;
        let database = get("database")?;
        let username = get("username")?;
        let password = get("password")?;

        Self::new(host, port, database, username, password)
    }

    /// Build from a JSON object `{host, port, database, username, password}`
    /// where every field is a string.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::InvalidValue(
                "config".to_string(),
                "must be an object".to_string(),
            ));
        }
        let raw: RawConnectionConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::InvalidValue("config".to_string(), e.to_string()))?;

        let field = |name: &str, v: Option<String>| {
            v.ok_or_else(|| ConfigError::MissingField(name.to_string()))
        };

        Self::new(
            field("host", raw.host)?,
            field("port", raw.port)?,
            field("database", raw.database)?,
            field("username", raw.username)?,
            field("password", raw.password)?,
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Connect options for `database` on this server, using this config's
    /// host, port and credentials.
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(database)
            .username(&self.username)
            .password(&self.password)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn non_empty(name: &str, value: String) -> Result<String, ConfigError> {
    if value.is_empty() {
        Err(ConfigError::InvalidValue(
            name.to_string(),
            "must not be empty".to_string(),
        ))
    } else {
        Ok(value)
    }
}

fn parse_port(port: &str) -> Result<u16, ConfigError> {
    port.parse::<u16>().map_err(|_| {
        ConfigError::InvalidValue("port".to_string(), "must be a valid u16".to_string())
    })
}

// Provisioning statements embed the name unquoted. The server folds unquoted
// names to lowercase while `datname='..'` and the pool match exactly, so only
// lowercase identifiers that are not keywords pass.
fn validate_database_name(name: String) -> Result<String, ConfigError> {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !starts_ok || !rest_ok {
        return Err(ConfigError::InvalidValue(
            "database".to_string(),
            format!("must be a lowercase identifier, got {}", name),
        ));
    }
    if RESERVED_KEYWORDS.contains(&name.as_str()) {
        return Err(ConfigError::InvalidValue(
            "database".to_string(),
            format!("{} is a reserved keyword", name),
        ));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(ConfigError::InvalidValue(
            "database".to_string(),
            format!("must be at most {} bytes", MAX_IDENTIFIER_LEN),
        ));
    }
    Ok(name)
}
