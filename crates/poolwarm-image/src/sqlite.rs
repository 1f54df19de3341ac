//! Embedded-database backend: one SQLite file per snapshot.
//!
//! Metadata lives in a one-row table and pages in a table keyed by an
//! explicit sequence column, so restores can stream pages in order without
//! loading the list into memory.

use crate::header::ImageHeader;
use crate::staging::StagedPath;
use crate::validate::{check_page_count, check_unique};
use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use poolwarm_core::ports::{CacheImage, OpenMode, PageStream};
use poolwarm_core::{Error, PageDescriptor, Result, SnapshotMetadata};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::debug;

pub const FORMAT_NAME: &str = "sqlite";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE image_format (name TEXT NOT NULL, version INTEGER NOT NULL)",
    "CREATE TABLE snapshot_metadata (\
        captured_at TEXT NOT NULL, \
        server_version TEXT NOT NULL, \
        buffer_pool_pages_total INTEGER NOT NULL, \
        buffer_pool_pages_data INTEGER NOT NULL, \
        page_count INTEGER NOT NULL)",
    "CREATE TABLE pages (\
        seq INTEGER PRIMARY KEY, \
        table_name TEXT NOT NULL, \
        index_name TEXT NOT NULL, \
        space_id INTEGER NOT NULL, \
        page_number INTEGER NOT NULL, \
        UNIQUE (space_id, page_number))",
];

const SELECT_PAGES: &str =
    "SELECT table_name, index_name, space_id, page_number FROM pages ORDER BY seq";

const SELECT_DUPLICATE: &str = "SELECT space_id, page_number FROM pages \
     GROUP BY space_id, page_number HAVING COUNT(*) > 1 LIMIT 1";

/// Everything SQLite reports about a file it was asked to read is a
/// structural problem with the image.
fn corrupt(err: sqlx::Error) -> Error {
    Error::ImageCorrupt(err.to_string())
}

fn write_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::ImageCorrupt(format!("duplicate page: {}", db_err.message()))
        }
        _ => Error::Internal(format!("sqlite image write failed: {}", err)),
    }
}

enum State {
    Closed,
    Writing {
        staged: StagedPath,
        pool: SqlitePool,
        metadata: Option<SnapshotMetadata>,
        next_seq: i64,
    },
    Reading {
        pool: SqlitePool,
        metadata: SnapshotMetadata,
    },
}

/// Snapshot stored as a SQLite database.
pub struct SqliteImage {
    state: State,
}

impl Default for SqliteImage {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteImage {
    pub fn new() -> Self {
        Self {
            state: State::Closed,
        }
    }

    async fn open_write(path: &Path) -> Result<State> {
        let staged = StagedPath::create(path).await?;
        let options = SqliteConnectOptions::new()
            .filename(staged.path())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(write_error)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(write_error)?;
        }
        let header = ImageHeader::current(FORMAT_NAME);
        sqlx::query("INSERT INTO image_format (name, version) VALUES (?, ?)")
            .bind(&header.name)
            .bind(i64::from(header.version))
            .execute(&pool)
            .await
            .map_err(write_error)?;

        Ok(State::Writing {
            staged,
            pool,
            metadata: None,
            next_seq: 0,
        })
    }

    async fn open_read(path: &Path) -> Result<State> {
        // Surface a missing file as an I/O error rather than corruption.
        tokio::fs::metadata(path).await?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .immutable(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(corrupt)?;

        match Self::validate(&pool).await {
            Ok(metadata) => Ok(State::Reading { pool, metadata }),
            Err(e) => {
                pool.close().await;
                Err(e)
            }
        }
    }

    /// Header, then metadata, then page table consistency.
    async fn validate(pool: &SqlitePool) -> Result<SnapshotMetadata> {
        let headers = sqlx::query("SELECT name, version FROM image_format")
            .fetch_all(pool)
            .await
            .map_err(corrupt)?;
        let [header] = headers.as_slice() else {
            return Err(Error::ImageCorrupt(format!(
                "expected one format header row, found {}",
                headers.len()
            )));
        };
        let version: i64 = header.try_get("version").map_err(corrupt)?;
        let header = ImageHeader {
            name: header.try_get("name").map_err(corrupt)?,
            version: u32::try_from(version)
                .map_err(|_| Error::ImageCorrupt(format!("invalid format version {}", version)))?,
        };
        header.check(FORMAT_NAME)?;

        let rows = sqlx::query(
            "SELECT captured_at, server_version, buffer_pool_pages_total, \
             buffer_pool_pages_data, page_count FROM snapshot_metadata",
        )
        .fetch_all(pool)
        .await
        .map_err(corrupt)?;
        let [row] = rows.as_slice() else {
            return Err(Error::ImageCorrupt(format!(
                "expected one metadata row, found {}",
                rows.len()
            )));
        };
        let metadata = row_to_metadata(row)?;

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(pool)
            .await
            .map_err(corrupt)?;
        check_page_count(&metadata, stored as u64)?;

        // Files from elsewhere may lack the UNIQUE constraint.
        let duplicate = sqlx::query(SELECT_DUPLICATE)
            .fetch_optional(pool)
            .await
            .map_err(corrupt)?;
        if let Some(row) = duplicate {
            let space_id: i64 = row.try_get("space_id").map_err(corrupt)?;
            let page_number: i64 = row.try_get("page_number").map_err(corrupt)?;
            return Err(Error::ImageCorrupt(format!(
                "duplicate page {}:{}",
                space_id, page_number
            )));
        }
        Ok(metadata)
    }
}

fn row_to_metadata(row: &SqliteRow) -> Result<SnapshotMetadata> {
    let captured_at: String = row.try_get("captured_at").map_err(corrupt)?;
    let captured_at = DateTime::parse_from_rfc3339(&captured_at)
        .map_err(|e| Error::ImageCorrupt(format!("invalid capture timestamp: {}", e)))?
        .with_timezone(&Utc);
    Ok(SnapshotMetadata {
        captured_at,
        server_version: row.try_get("server_version").map_err(corrupt)?,
        buffer_pool_pages_total: non_negative(row, "buffer_pool_pages_total")?,
        buffer_pool_pages_data: non_negative(row, "buffer_pool_pages_data")?,
        page_count: non_negative(row, "page_count")?,
    })
}

fn non_negative(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(corrupt)?;
    u64::try_from(value).map_err(|_| Error::ImageCorrupt(format!("negative {}: {}", column, value)))
}

fn row_to_page(row: &SqliteRow) -> Result<PageDescriptor> {
    let space_id: i64 = row.try_get("space_id").map_err(corrupt)?;
    let page_number: i64 = row.try_get("page_number").map_err(corrupt)?;
    Ok(PageDescriptor {
        table_name: row.try_get("table_name").map_err(corrupt)?,
        index_name: row.try_get("index_name").map_err(corrupt)?,
        space_id: u32::try_from(space_id)
            .map_err(|_| Error::ImageCorrupt(format!("invalid space id {}", space_id)))?,
        page_number: u32::try_from(page_number)
            .map_err(|_| Error::ImageCorrupt(format!("invalid page number {}", page_number)))?,
    })
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Serialization(format!("{} too large: {}", what, value)))
}

#[async_trait]
impl CacheImage for SqliteImage {
    fn format_name(&self) -> &'static str {
        FORMAT_NAME
    }

    async fn open(&mut self, path: &Path, mode: OpenMode) -> Result<()> {
        if !matches!(self.state, State::Closed) {
            return Err(Error::Internal("image is already open".into()));
        }
        self.state = match mode {
            OpenMode::Write => Self::open_write(path).await?,
            OpenMode::Read => Self::open_read(path).await?,
        };
        debug!(path = %path.display(), ?mode, "SQLite image opened");
        Ok(())
    }

    async fn write_metadata(&mut self, new_metadata: &SnapshotMetadata) -> Result<()> {
        let State::Writing { pool, metadata, .. } = &mut self.state else {
            return Err(Error::Internal("image is not open for writing".into()));
        };
        if metadata.is_some() {
            return Err(Error::Internal("metadata already written".into()));
        }

        sqlx::query(
            "INSERT INTO snapshot_metadata (captured_at, server_version, \
             buffer_pool_pages_total, buffer_pool_pages_data, page_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(
            new_metadata
                .captured_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        )
        .bind(&new_metadata.server_version)
        .bind(to_i64(new_metadata.buffer_pool_pages_total, "buffer_pool_pages_total")?)
        .bind(to_i64(new_metadata.buffer_pool_pages_data, "buffer_pool_pages_data")?)
        .bind(to_i64(new_metadata.page_count, "page_count")?)
        .execute(&*pool)
        .await
        .map_err(write_error)?;

        *metadata = Some(new_metadata.clone());
        Ok(())
    }

    async fn write_pages(&mut self, pages: &[PageDescriptor]) -> Result<()> {
        let State::Writing {
            pool,
            metadata,
            next_seq,
            ..
        } = &mut self.state
        else {
            return Err(Error::Internal("image is not open for writing".into()));
        };
        check_unique(pages)?;
        if let Some(metadata) = metadata {
            let total = *next_seq as u64 + pages.len() as u64;
            if total > metadata.page_count {
                check_page_count(metadata, total)?;
            }
        }

        let mut seq = *next_seq;
        let mut tx = pool.begin().await.map_err(write_error)?;
        for page in pages {
            sqlx::query(
                "INSERT INTO pages (seq, table_name, index_name, space_id, page_number) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(seq)
            .bind(&page.table_name)
            .bind(&page.index_name)
            .bind(i64::from(page.space_id))
            .bind(i64::from(page.page_number))
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
            seq += 1;
        }
        tx.commit().await.map_err(write_error)?;
        *next_seq = seq;
        Ok(())
    }

    async fn read_metadata(&mut self) -> Result<SnapshotMetadata> {
        match &self.state {
            State::Reading { metadata, .. } => Ok(metadata.clone()),
            _ => Err(Error::Internal("image is not open for reading".into())),
        }
    }

    async fn read_pages(&mut self) -> Result<PageStream> {
        let State::Reading { pool, .. } = &self.state else {
            return Err(Error::Internal("image is not open for reading".into()));
        };
        let pool = pool.clone();
        let stream = try_stream! {
            let mut rows = sqlx::query(SELECT_PAGES).fetch(&pool);
            while let Some(row) = rows.try_next().await.map_err(corrupt)? {
                yield row_to_page(&row)?;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Writing {
                staged,
                pool,
                metadata,
                next_seq,
            } => {
                let result = match &metadata {
                    Some(metadata) => check_page_count(metadata, next_seq as u64),
                    None => Err(Error::ImageCorrupt(
                        "image closed before metadata was written".into(),
                    )),
                };
                pool.close().await;
                result?;
                let target = staged.publish()?;
                debug!(path = %target.display(), pages = next_seq, "SQLite image published");
                Ok(())
            }
            State::Reading { pool, .. } => {
                pool.close().await;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }

    async fn abort(&mut self) {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Writing { staged, pool, .. } => {
                pool.close().await;
                debug!(target = %staged.target().display(), "Discarding staged image");
            }
            State::Reading { pool, .. } => pool.close().await,
            State::Closed => {}
        }
    }
}
