//! Structured-file backends: the whole snapshot as one serialized record.

use crate::header::ImageHeader;
use crate::staging::StagedPath;
use crate::validate::{admit_unique, check_page_count, check_unique};
use async_trait::async_trait;
use futures::StreamExt;
use poolwarm_core::ports::{CacheImage, OpenMode, PageStream};
use poolwarm_core::{Error, PageDescriptor, PageKey, Result, SnapshotMetadata};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Encoding of a structured-file image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Yaml,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Yaml => "yaml",
        }
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => {
                let mut bytes = serde_json::to_vec_pretty(value)?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            Codec::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| Error::Serialization(e.to_string())),
        }
    }

    /// Decode failures are structural, so they surface as corruption.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Json => serde_json::from_slice(bytes)
                .map_err(|e| Error::ImageCorrupt(format!("invalid json image: {}", e))),
            Codec::Yaml => serde_yaml::from_slice(bytes)
                .map_err(|e| Error::ImageCorrupt(format!("invalid yaml image: {}", e))),
        }
    }
}

/// On-disk layout. Field order is fixed so equal input gives equal bytes.
#[derive(Debug, Serialize, Deserialize)]
struct ImageDocument {
    format: ImageHeader,
    metadata: SnapshotMetadata,
    pages: Vec<PageDescriptor>,
}

/// Just the header, read before the payload is interpreted.
#[derive(Debug, Deserialize)]
struct HeaderProbe {
    format: ImageHeader,
}

enum State {
    Closed,
    Writing {
        staged: StagedPath,
        metadata: Option<SnapshotMetadata>,
        pages: Vec<PageDescriptor>,
        seen: HashSet<PageKey>,
    },
    Reading {
        metadata: SnapshotMetadata,
        pages: Arc<Vec<PageDescriptor>>,
    },
}

/// Snapshot serialized as a single nested record. Reads materialize the
/// whole page list in memory.
pub struct StructuredFileImage {
    codec: Codec,
    state: State,
}

impl StructuredFileImage {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            state: State::Closed,
        }
    }

    pub fn json() -> Self {
        Self::new(Codec::Json)
    }

    pub fn yaml() -> Self {
        Self::new(Codec::Yaml)
    }

    fn parse(&self, bytes: &[u8]) -> Result<(SnapshotMetadata, Vec<PageDescriptor>)> {
        let probe: HeaderProbe = self.codec.decode(bytes)?;
        probe.format.check(self.codec.name())?;

        let document: ImageDocument = self.codec.decode(bytes)?;
        check_page_count(&document.metadata, document.pages.len() as u64)?;
        check_unique(&document.pages)?;
        Ok((document.metadata, document.pages))
    }
}

#[async_trait]
impl CacheImage for StructuredFileImage {
    fn format_name(&self) -> &'static str {
        self.codec.name()
    }

    async fn open(&mut self, path: &Path, mode: OpenMode) -> Result<()> {
        if !matches!(self.state, State::Closed) {
            return Err(Error::Internal("image is already open".into()));
        }

        self.state = match mode {
            OpenMode::Write => State::Writing {
                staged: StagedPath::create(path).await?,
                metadata: None,
                pages: Vec::new(),
                seen: HashSet::new(),
            },
            OpenMode::Read => {
                let bytes = tokio::fs::read(path).await?;
                let (metadata, pages) = self.parse(&bytes)?;
                debug!(path = %path.display(), pages = pages.len(), format = self.codec.name(), "Image loaded");
                State::Reading {
                    metadata,
                    pages: Arc::new(pages),
                }
            }
        };
        Ok(())
    }

    async fn write_metadata(&mut self, new_metadata: &SnapshotMetadata) -> Result<()> {
        match &mut self.state {
            State::Writing { metadata, pages, .. } => {
                if metadata.is_some() {
                    return Err(Error::Internal("metadata already written".into()));
                }
                if pages.len() as u64 > new_metadata.page_count {
                    check_page_count(new_metadata, pages.len() as u64)?;
                }
                *metadata = Some(new_metadata.clone());
                Ok(())
            }
            _ => Err(Error::Internal("image is not open for writing".into())),
        }
    }

    async fn write_pages(&mut self, new_pages: &[PageDescriptor]) -> Result<()> {
        match &mut self.state {
            State::Writing {
                metadata,
                pages,
                seen,
                ..
            } => {
                let total = (pages.len() + new_pages.len()) as u64;
                if let Some(metadata) = metadata {
                    if total > metadata.page_count {
                        check_page_count(metadata, total)?;
                    }
                }
                admit_unique(seen, new_pages)?;
                pages.extend_from_slice(new_pages);
                Ok(())
            }
            _ => Err(Error::Internal("image is not open for writing".into())),
        }
    }

    async fn read_metadata(&mut self) -> Result<SnapshotMetadata> {
        match &self.state {
            State::Reading { metadata, .. } => Ok(metadata.clone()),
            _ => Err(Error::Internal("image is not open for reading".into())),
        }
    }

    async fn read_pages(&mut self) -> Result<PageStream> {
        match &self.state {
            State::Reading { pages, .. } => {
                let pages = Arc::clone(pages);
                let len = pages.len();
                Ok(futures::stream::iter(0..len)
                    .map(move |i| Ok(pages[i].clone()))
                    .boxed())
            }
            _ => Err(Error::Internal("image is not open for reading".into())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Writing {
                staged,
                metadata,
                pages,
                ..
            } => {
                let metadata = metadata.ok_or_else(|| {
                    Error::ImageCorrupt("image closed before metadata was written".into())
                })?;
                check_page_count(&metadata, pages.len() as u64)?;

                let document = ImageDocument {
                    format: ImageHeader::current(self.codec.name()),
                    metadata,
                    pages,
                };
                let bytes = self.codec.encode(&document)?;
                tokio::fs::write(staged.path(), &bytes).await?;
                let target = staged.publish()?;
                debug!(path = %target.display(), bytes = bytes.len(), "Image published");
                Ok(())
            }
            State::Reading { .. } | State::Closed => Ok(()),
        }
    }

    async fn abort(&mut self) {
        if let State::Writing { staged, .. } = std::mem::replace(&mut self.state, State::Closed) {
            debug!(target = %staged.target().display(), "Discarding staged image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use futures::TryStreamExt;

    fn metadata(page_count: u64) -> SnapshotMetadata {
        SnapshotMetadata {
            captured_at: Utc.timestamp_opt(1_760_000_000, 250_000_000).unwrap(),
            server_version: "8.0.36".into(),
            buffer_pool_pages_total: 8192,
            buffer_pool_pages_data: 4000,
            page_count,
        }
    }

    fn pages() -> Vec<PageDescriptor> {
        vec![
            PageDescriptor::new("`shop`.`orders`", "PRIMARY", 10, 3),
            PageDescriptor::new("`shop`.`orders`", "idx_customer", 10, 44),
            PageDescriptor::new("`shop`.`items`", "PRIMARY", 11, 5),
        ]
    }

    async fn write(image: &mut StructuredFileImage, path: &Path) {
        image.open(path, OpenMode::Write).await.unwrap();
        image.write_metadata(&metadata(3)).await.unwrap();
        image.write_pages(&pages()).await.unwrap();
        image.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        write(&mut StructuredFileImage::json(), &path).await;

        let mut image = StructuredFileImage::json();
        image.open(&path, OpenMode::Read).await.unwrap();
        assert_eq!(image.read_metadata().await.unwrap(), metadata(3));
        let read: Vec<_> = image.read_pages().await.unwrap().try_collect().await.unwrap();
        assert_eq!(read, pages());

        // Restartable.
        let again: Vec<_> = image.read_pages().await.unwrap().try_collect().await.unwrap();
        assert_eq!(again, pages());
        image.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_yaml_output_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.yaml");
        let b = dir.path().join("b.yaml");
        write(&mut StructuredFileImage::yaml(), &a).await;
        write(&mut StructuredFileImage::yaml(), &b).await;

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[tokio::test]
    async fn test_json_output_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        write(&mut StructuredFileImage::json(), &a).await;
        write(&mut StructuredFileImage::json(), &b).await;

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[tokio::test]
    async fn test_json_header_precedes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        write(&mut StructuredFileImage::json(), &path).await;

        let text = std::fs::read_to_string(&path).unwrap();
        let format_at = text.find("\"format\"").unwrap();
        let pages_at = text.find("\"pages\"").unwrap();
        assert!(format_at < pages_at);
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(
            &path,
            r#"{"format":{"name":"json","version":99},"payload":"unknown layout"}"#,
        )
        .unwrap();

        let mut image = StructuredFileImage::json();
        let err = image.open(&path, OpenMode::Read).await.unwrap_err();
        assert!(matches!(err, Error::ImageVersionMismatch { found: 99, .. }));
        assert!(image.read_metadata().await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        write(&mut StructuredFileImage::json(), &path).await;
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let mut image = StructuredFileImage::json();
        let err = image.open(&path, OpenMode::Read).await.unwrap_err();
        assert!(matches!(err, Error::ImageCorrupt(_)));
        assert!(image.read_metadata().await.is_err());
    }

    #[tokio::test]
    async fn test_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let document = ImageDocument {
            format: ImageHeader::current("json"),
            metadata: metadata(5),
            pages: pages(),
        };
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let err = StructuredFileImage::json()
            .open(&path, OpenMode::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageCorrupt(_)));
    }

    #[tokio::test]
    async fn test_duplicate_pages_rejected_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let mut image = StructuredFileImage::json();
        image.open(&path, OpenMode::Write).await.unwrap();
        image.write_metadata(&metadata(4)).await.unwrap();

        let mut dup = pages();
        dup.push(PageDescriptor::new("`shop`.`other`", "PRIMARY", 10, 3));
        let err = image.write_pages(&dup).await.unwrap_err();
        assert!(matches!(err, Error::ImageCorrupt(_)));

        image.abort().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejected_chunk_is_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let all = pages();
        let mut image = StructuredFileImage::json();
        image.open(&path, OpenMode::Write).await.unwrap();
        image.write_metadata(&metadata(3)).await.unwrap();
        image.write_pages(&all[..1]).await.unwrap();

        let bad = vec![all[1].clone(), all[0].clone()];
        assert!(image.write_pages(&bad).await.is_err());

        image.write_pages(&all[1..]).await.unwrap();
        image.close().await.unwrap();

        let mut image = StructuredFileImage::json();
        image.open(&path, OpenMode::Read).await.unwrap();
        let read: Vec<_> = image.read_pages().await.unwrap().try_collect().await.unwrap();
        assert_eq!(read, all);
    }

    #[tokio::test]
    async fn test_many_chunks_write_in_linear_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        let big: Vec<_> = (0..200_000u32)
            .map(|i| PageDescriptor::new("`shop`.`orders`", "PRIMARY", i / 50_000, i))
            .collect();

        let mut image = StructuredFileImage::json();
        image.open(&path, OpenMode::Write).await.unwrap();
        image.write_metadata(&metadata(big.len() as u64)).await.unwrap();
        let started = std::time::Instant::now();
        for chunk in big.chunks(100) {
            image.write_pages(chunk).await.unwrap();
        }
        // Rescanning the whole list per chunk would take minutes here.
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
        image.abort().await;
    }

    #[tokio::test]
    async fn test_abort_leaves_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        write(&mut StructuredFileImage::json(), &path).await;
        let before = std::fs::read(&path).unwrap();

        let mut image = StructuredFileImage::json();
        image.open(&path, OpenMode::Write).await.unwrap();
        image.write_metadata(&metadata(1)).await.unwrap();
        image.abort().await;

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
