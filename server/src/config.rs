//! Configuration management for the server.

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Schema put first on the search path of every connection
    pub database_schema: Option<String>,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long a request waits for a pooled connection
    pub acquire_timeout: Duration,
    /// Enforcement toggle: when set, requests without a bearer token are
    /// rejected instead of running as the anonymous caller. The value itself
    /// is not compared; tokens are verified upstream.
    pub auth_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let database_schema = env::var("DATABASE_SCHEMA").ok().filter(|s| !s.is_empty());

        let max_connections = number("DB_MAX_CONNECTIONS", 10)?;
        let acquire_timeout = Duration::from_secs(number("DB_ACQUIRE_TIMEOUT_SECS", 5)?);

        let auth_secret = env::var("AUTH_SECRET").ok();

        Ok(Self {
            host,
            port,
            database_url,
            database_schema,
            max_connections,
            acquire_timeout,
            auth_secret,
        })
    }

    /// Defaults for everything but the database.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: database_url.into(),
            database_schema: None,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            auth_secret: None,
        }
    }
}

fn number<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {var} value: {value}")]
    InvalidNumber { var: &'static str, value: String },
}
