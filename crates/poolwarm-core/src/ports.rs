//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the engine and its adapters:
//! the database server on one side and image storage on the other.

use crate::batch::FetchOutcome;
use crate::config::EngineConfig;
use crate::page::{PageDescriptor, SnapshotMetadata};
use crate::status::ServerStatus;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// Finite stream of pages read back from an image.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageDescriptor>> + Send>>;

/// Opens connections to a database server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect using the connection options, pool size and timeout in `config`.
    async fn connect(&self, config: &EngineConfig) -> Result<Arc<dyn ServerConnection>>;
}

/// A live connection to the database server.
#[async_trait]
pub trait ServerConnection: Send + Sync {
    /// Server version string.
    async fn server_version(&self) -> Result<String>;

    /// Named status counters.
    async fn status(&self) -> Result<ServerStatus>;

    /// Pages resident in the buffer pool, most valuable first.
    async fn buffer_pool_pages(&self) -> Result<Vec<PageDescriptor>>;

    /// Read data residing on `page` so the server caches it.
    async fn fetch_page(&self, page: &PageDescriptor) -> Result<FetchOutcome>;

    /// Release the connection.
    async fn close(&self);
}

/// How an image is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Persisted representation of one snapshot.
///
/// Writes are staged and only become visible at `path` when `close`
/// succeeds. Reads validate structure and format version on `open`.
#[async_trait]
pub trait CacheImage: Send {
    /// Registry name of this backend.
    fn format_name(&self) -> &'static str;

    async fn open(&mut self, path: &Path, mode: OpenMode) -> Result<()>;

    async fn write_metadata(&mut self, metadata: &SnapshotMetadata) -> Result<()>;

    async fn write_pages(&mut self, pages: &[PageDescriptor]) -> Result<()>;

    async fn read_metadata(&mut self) -> Result<SnapshotMetadata>;

    /// Pages in stored order. Each call starts again from the first page.
    async fn read_pages(&mut self) -> Result<PageStream>;

    /// Finish the image. In write mode this publishes it atomically.
    async fn close(&mut self) -> Result<()>;

    /// Discard an unpublished write. No-op in read mode.
    async fn abort(&mut self);
}
