//! Page enumerator: which pages are resident, most valuable first.

use crate::deadline::with_timeout;
use crate::status::StatusReader;
use poolwarm_core::page::dedup_pages;
use poolwarm_core::ports::ServerConnection;
use poolwarm_core::{PageDescriptor, Result, ServerStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct PageEnumerator {
    connection: Arc<dyn ServerConnection>,
    status: StatusReader,
    timeout: Duration,
}

impl PageEnumerator {
    pub fn new(connection: Arc<dyn ServerConnection>, timeout: Duration) -> Self {
        Self {
            status: StatusReader::new(Arc::clone(&connection), timeout),
            connection,
            timeout,
        }
    }

    /// Resident pages in the server's eviction-priority order.
    ///
    /// The order is kept verbatim. A page listed more than once keeps only
    /// its first position, so the result never holds a repeated
    /// `(space_id, page_number)`.
    pub async fn enumerate(&self) -> Result<Vec<PageDescriptor>> {
        let mut pages = with_timeout(
            "buffer pool enumeration",
            self.timeout,
            self.connection.buffer_pool_pages(),
        )
        .await?;

        let dropped = dedup_pages(&mut pages);
        if dropped > 0 {
            debug!(dropped, "Dropped repeated page entries");
        }
        info!(pages = pages.len(), "Enumerated buffer pool pages");
        Ok(pages)
    }

    pub async fn status(&self) -> Result<ServerStatus> {
        self.status.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedServer, pages};

    #[tokio::test]
    async fn test_repeats_keep_first_position() {
        let [a, b, c]: [PageDescriptor; 3] = pages(3).try_into().unwrap();
        let server = Arc::new(ScriptedServer::with_resident(vec![
            a.clone(),
            c.clone(),
            b.clone(),
            c.clone(),
        ]));

        let enumerator = PageEnumerator::new(server, Duration::from_secs(1));
        assert_eq!(enumerator.enumerate().await.unwrap(), vec![a, c, b]);
    }

    #[tokio::test]
    async fn test_status_reads_server_counters() {
        let server = Arc::new(ScriptedServer::with_resident(pages(5)));

        let status = PageEnumerator::new(server, Duration::from_secs(1))
            .status()
            .await
            .unwrap();
        assert_eq!(status.pool_pages_total(), Some(8192));
        assert_eq!(status.pool_pages_data(), Some(5));
        assert_eq!(status.data_read(), Some(0));
    }
}
