//! Cache manager: orchestrates one save or one restore.

use crate::cancel::CancelSignal;
use crate::deadline::with_timeout;
use crate::enumerator::PageEnumerator;
use crate::restorer::{BatchRestorer, RestoreTotals};
use crate::status::StatusReader;
use poolwarm_core::ports::{CacheImage, Connector, OpenMode, ServerConnection};
use poolwarm_core::{
    BatchResult, EngineConfig, Error, PageDescriptor, Phase, Progress, Result, ServerStatus,
    SnapshotMetadata, TimingLedger,
};
use poolwarm_image::ImageBackend;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

/// Lifecycle of a manager. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Connected,
    Saving,
    Restoring,
    Closed,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Idle => "idle",
            ManagerState::Connected => "connected",
            ManagerState::Saving => "saving",
            ManagerState::Restoring => "restoring",
            ManagerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of a save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    /// Pages written to the image. Zero when cancelled.
    pub page_count: u64,
    /// No image was published because the save was cancelled.
    pub cancelled: bool,
    pub timings: TimingLedger,
}

/// Outcome of a restore. Derived statistics are left to the caller.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub pages_fetched: u64,
    pub pages_attempted: u64,
    pub batches: usize,
    pub cancelled: bool,
    /// Metadata of the image that was replayed.
    pub metadata: SnapshotMetadata,
    pub status_before: ServerStatus,
    pub status_after: ServerStatus,
    pub timings: TimingLedger,
    /// The image holds more pages than the target buffer pool can cache.
    pub capacity_warning: bool,
}

pub struct CacheManager {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    backend: &'static ImageBackend,
    state: ManagerState,
}

impl CacheManager {
    /// Validate `config` and resolve its image backend. Nothing touches the
    /// filesystem or the network until `save` or `restore` runs.
    pub fn new(config: EngineConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let backend = poolwarm_image::lookup(&config.image_format)?;
        config.validate()?;
        Ok(Self {
            config,
            connector,
            backend,
            state: ManagerState::Idle,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Capture the resident page list into the image at `path`.
    pub async fn save(mut self, path: &Path, cancel: CancelSignal) -> Result<SaveReport> {
        let span = info_span!(
            "save",
            path = %path.display(),
            format = self.backend.name,
            target = %self.config.connection.display_target()
        );
        async move {
            info!("Saving buffer pool snapshot");
            let mut timings = TimingLedger::new();
            let connection = self.connect(&mut timings).await?;

            let outcome = self.save_with(&connection, path, &cancel, &mut timings).await;
            connection.close().await;
            self.transition(ManagerState::Closed);

            let page_count = outcome?;
            let report = SaveReport {
                page_count: page_count.unwrap_or(0),
                cancelled: page_count.is_none(),
                timings,
            };
            if report.cancelled {
                info!("Save cancelled, no image written");
            } else {
                info!(pages = report.page_count, "Snapshot saved");
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Replay the image at `path` against the server.
    ///
    /// `on_batch` runs after every batch with cumulative progress.
    pub async fn restore<F>(
        mut self,
        path: &Path,
        on_batch: F,
        cancel: CancelSignal,
    ) -> Result<RestoreReport>
    where
        F: FnMut(&BatchResult, Progress),
    {
        let span = info_span!(
            "restore",
            path = %path.display(),
            format = self.backend.name,
            target = %self.config.connection.display_target()
        );
        async move {
            info!("Restoring buffer pool snapshot");
            let mut timings = TimingLedger::new();
            let connection = self.connect(&mut timings).await?;

            let mut image = self.backend.create();
            let outcome = self
                .restore_with(&connection, image.as_mut(), path, on_batch, cancel, &mut timings)
                .await;
            image.abort().await;
            connection.close().await;
            self.transition(ManagerState::Closed);

            let report = outcome?;
            info!(
                fetched = report.pages_fetched,
                attempted = report.pages_attempted,
                batches = report.batches,
                cancelled = report.cancelled,
                "Restore finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, next: ManagerState) {
        debug!(from = %self.state, to = %next, "Cache manager transition");
        self.state = next;
    }

    async fn connect(&mut self, timings: &mut TimingLedger) -> Result<Arc<dyn ServerConnection>> {
        let limit = self.config.network_timeout;
        let connected = timings
            .time(
                Phase::Connect,
                with_timeout("connect", limit, self.connector.connect(&self.config)),
            )
            .await;
        match connected {
            Ok(connection) => {
                self.transition(ManagerState::Connected);
                Ok(connection)
            }
            Err(e) => {
                self.transition(ManagerState::Closed);
                Err(e.in_phase(Phase::Connect))
            }
        }
    }

    /// `Ok(None)` means the save was cancelled before publishing.
    async fn save_with(
        &mut self,
        connection: &Arc<dyn ServerConnection>,
        path: &Path,
        cancel: &CancelSignal,
        timings: &mut TimingLedger,
    ) -> Result<Option<u64>> {
        let limit = self.config.network_timeout;
        let reader = StatusReader::new(Arc::clone(connection), limit);
        let enumerator = PageEnumerator::new(Arc::clone(connection), limit);

        let (version, status) = timings
            .time(Phase::Status, async {
                let version = reader.server_version().await?;
                let status = enumerator.status().await?;
                Ok::<_, Error>((version, status))
            })
            .await
            .map_err(|e| e.in_phase(Phase::Status))?;

        let pages = timings
            .time(Phase::Enumerate, enumerator.enumerate())
            .await
            .map_err(|e| e.in_phase(Phase::Enumerate))?;

        if cancel.is_cancelled() {
            return Ok(None);
        }

        self.transition(ManagerState::Saving);
        let metadata = SnapshotMetadata::capture(version, &status, pages.len() as u64);
        let mut image = self.backend.create();
        let written = timings
            .time(
                Phase::Write,
                write_image(image.as_mut(), path, &metadata, &pages, self.config.batch_size, cancel),
            )
            .await;

        match written {
            Ok(true) => Ok(Some(metadata.page_count)),
            Ok(false) => Ok(None),
            Err(e) => {
                image.abort().await;
                Err(e.in_phase(Phase::Write))
            }
        }
    }

    async fn restore_with<F>(
        &mut self,
        connection: &Arc<dyn ServerConnection>,
        image: &mut dyn CacheImage,
        path: &Path,
        on_batch: F,
        cancel: CancelSignal,
        timings: &mut TimingLedger,
    ) -> Result<RestoreReport>
    where
        F: FnMut(&BatchResult, Progress),
    {
        let limit = self.config.network_timeout;
        let reader = StatusReader::new(Arc::clone(connection), limit);

        let (metadata, pages) = timings
            .time(Phase::Read, async {
                image.open(path, OpenMode::Read).await?;
                let metadata = image.read_metadata().await?;
                let pages = image.read_pages().await?;
                Ok::<_, Error>((metadata, pages))
            })
            .await
            .map_err(|e| e.in_phase(Phase::Read))?;
        debug!(
            pages = metadata.page_count,
            captured_at = %metadata.captured_at,
            server_version = %metadata.server_version,
            "Image opened"
        );

        let status_before = timings
            .time(Phase::Status, reader.read())
            .await
            .map_err(|e| e.in_phase(Phase::Status))?;

        let capacity_warning = metadata.exceeds_capacity(&status_before);
        if capacity_warning {
            warn!(
                image_pages = metadata.page_count,
                pool_pages = ?status_before.pool_pages_total(),
                "Image holds more pages than the target buffer pool can cache"
            );
        }

        self.transition(ManagerState::Restoring);
        let restorer = BatchRestorer::new(
            Arc::clone(connection),
            self.config.fetch_concurrency,
            limit,
        )
        .with_cancel(cancel)
        .with_expected_pages(metadata.page_count);
        let totals: RestoreTotals = timings
            .time(
                Phase::Fetch,
                restorer.restore(pages, self.config.batch_size, on_batch),
            )
            .await
            .map_err(|e| e.in_phase(Phase::Fetch))?;

        let status_after = timings
            .time(Phase::Status, reader.read())
            .await
            .map_err(|e| e.in_phase(Phase::Status))?;
        image.close().await.map_err(|e| e.in_phase(Phase::Read))?;

        Ok(RestoreReport {
            pages_fetched: totals.pages_fetched,
            pages_attempted: totals.pages_attempted,
            batches: totals.batches,
            cancelled: totals.cancelled,
            metadata,
            status_before,
            status_after,
            timings: std::mem::take(timings),
            capacity_warning,
        })
    }
}

/// Write and publish the image. Returns `false` if cancelled, in which
/// case the staged write has already been discarded.
async fn write_image(
    image: &mut dyn CacheImage,
    path: &Path,
    metadata: &SnapshotMetadata,
    pages: &[PageDescriptor],
    chunk_size: usize,
    cancel: &CancelSignal,
) -> Result<bool> {
    image.open(path, OpenMode::Write).await?;
    image.write_metadata(metadata).await?;
    for chunk in pages.chunks(chunk_size) {
        if cancel.is_cancelled() {
            image.abort().await;
            return Ok(false);
        }
        image.write_pages(chunk).await?;
    }
    image.close().await?;
    debug!(path = %path.display(), pages = pages.len(), "Image published");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::testing::{ScriptedConnector, ScriptedServer, pages};
    use poolwarm_core::ConnectionOptions;
    use std::sync::atomic::Ordering;

    fn config(format: &str) -> EngineConfig {
        EngineConfig::new(ConnectionOptions::default())
            .with_image_format(format)
            .with_batch_size(4)
    }

    #[test]
    fn test_unknown_format_rejected_before_connect() {
        let connector = ScriptedConnector::new(Arc::new(ScriptedServer::default()));
        let err = CacheManager::new(config("xyz"), connector.clone())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedImageFormat(_)));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let connector = ScriptedConnector::new(Arc::new(ScriptedServer::default()));
        let err = CacheManager::new(config("json").with_batch_size(0), connector)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_save_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.img");
        let server = Arc::new(ScriptedServer::with_resident(pages(10)));
        let connector = ScriptedConnector::new(server.clone());

        let manager = CacheManager::new(config("json"), connector.clone()).unwrap();
        assert_eq!(manager.state(), ManagerState::Idle);
        let saved = manager.save(&path, CancelSignal::never()).await.unwrap();
        assert_eq!(saved.page_count, 10);
        assert!(!saved.cancelled);
        assert!(saved.timings.get(Phase::Write).is_some());
        assert!(server.is_closed());

        let mut announced = Vec::new();
        let report = CacheManager::new(config("JSON"), connector)
            .unwrap()
            .restore(
                &path,
                |_, progress| announced.push(progress.pages_total),
                CancelSignal::never(),
            )
            .await
            .unwrap();

        // The image's page count reaches the hook from the first batch on.
        assert_eq!(announced, vec![10, 10, 10]);
        assert_eq!(report.pages_fetched, 10);
        assert_eq!(report.pages_attempted, 10);
        assert_eq!(report.metadata.page_count, 10);
        assert!(!report.capacity_warning);
        assert!(report.status_after.data_read() > report.status_before.data_read());
        for phase in [Phase::Connect, Phase::Read, Phase::Status, Phase::Fetch] {
            assert!(report.timings.get(phase).is_some(), "missing {phase}");
        }
    }

    #[tokio::test]
    async fn test_connection_failure_names_phase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.img");
        let server = Arc::new(ScriptedServer::default());
        server.refuse_connections();

        let err = CacheManager::new(config("yaml"), ScriptedConnector::new(server))
            .unwrap()
            .save(&path, CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Connect));
        assert!(matches!(err.root(), Error::Connection(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cancelled_save_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.img");
        let server = Arc::new(ScriptedServer::with_resident(pages(5)));
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let report = CacheManager::new(config("json"), ScriptedConnector::new(server))
            .unwrap()
            .save(&path, signal)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.page_count, 0);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_restore_of_missing_image_fails_in_read_phase() {
        let dir = tempfile::tempdir().unwrap();
        let server = Arc::new(ScriptedServer::default());

        let err = CacheManager::new(config("json"), ScriptedConnector::new(server.clone()))
            .unwrap()
            .restore(&dir.path().join("absent.img"), |_, _| {}, CancelSignal::never())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Read));
        assert!(matches!(err.root(), Error::Io(_)));
        assert_eq!(server.fetch_count(), 0);
        assert!(server.is_closed());
    }
}
