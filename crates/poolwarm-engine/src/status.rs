//! Server status accessor.

use crate::deadline::with_timeout;
use poolwarm_core::ports::ServerConnection;
use poolwarm_core::{Result, ServerStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reads counters and the version string, each call bounded by the
/// network timeout.
#[derive(Clone)]
pub struct StatusReader {
    connection: Arc<dyn ServerConnection>,
    timeout: Duration,
}

impl StatusReader {
    pub fn new(connection: Arc<dyn ServerConnection>, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    pub async fn read(&self) -> Result<ServerStatus> {
        let status = with_timeout("server status", self.timeout, self.connection.status()).await?;
        debug!(
            data_read = ?status.data_read(),
            pages_total = ?status.pool_pages_total(),
            pages_data = ?status.pool_pages_data(),
            "Read server status"
        );
        Ok(status)
    }

    pub async fn server_version(&self) -> Result<String> {
        with_timeout(
            "server version",
            self.timeout,
            self.connection.server_version(),
        )
        .await
    }
}
