//! Engine configuration.

use crate::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Where and how to reach the database server.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Default schema for the session, if any.
    pub database: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            database: None,
        }
    }
}

impl ConnectionOptions {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// `user@host:port`, safe to log.
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

/// Explicit configuration for one save or restore operation.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Image backend name, matched case-insensitively against the registry.
    pub image_format: String,
    /// Pages per restore batch.
    pub batch_size: usize,
    /// Concurrent page fetches within a batch.
    pub fetch_concurrency: usize,
    /// Upper bound for every network call.
    pub network_timeout: Duration,
    pub connection: ConnectionOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_format: "json".to_string(),
            batch_size: 1000,
            fetch_concurrency: 4,
            network_timeout: Duration::from_secs(30),
            connection: ConnectionOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(connection: ConnectionOptions) -> Self {
        Self {
            connection,
            ..Default::default()
        }
    }

    pub fn with_image_format(mut self, format: impl Into<String>) -> Self {
        self.image_format = format.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Check the numeric options. The image format is checked against the
    /// backend registry by the engine.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "batch size must be a positive integer".into(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "fetch concurrency must be a positive integer".into(),
            ));
        }
        if self.network_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "network timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
