//! Maps a buffer pool page to a read that touches it.
//!
//! InnoDB offers no way to load a page by number through SQL. The locator
//! instead estimates where the page sits in its index (page number times
//! average rows per page) and reads a one-page window of index entries at
//! that offset, forcing the index so the server walks its own pages.

use crate::names::{QualifiedTable, quote_ident};
use crate::queries;
use crate::classify::map_query_error;
use poolwarm_core::Result;
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Name InnoDB gives the clustered index of a table without a primary key.
pub const IMPLICIT_CLUSTERED_INDEX: &str = "GEN_CLUST_INDEX";

/// First page of a file-per-table tablespace that can hold index records.
pub const FIRST_INDEX_PAGE: u32 = 3;

/// What the locator knows about one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProfile {
    pub table: QualifiedTable,
    pub index_name: String,
    /// Key columns in index order. Empty for the implicit clustered index.
    pub columns: Vec<String>,
    pub rows_per_page: u64,
}

impl IndexProfile {
    /// Estimated number of index entries before `page_number`.
    pub fn window_offset(&self, page_number: u32) -> u64 {
        u64::from(page_number.saturating_sub(FIRST_INDEX_PAGE)) * self.rows_per_page
    }

    /// Query reading one page worth of entries. Binds `LIMIT` then `OFFSET`.
    pub fn fetch_sql(&self) -> String {
        if self.columns.is_empty() {
            return format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT ? OFFSET ?) AS page_window",
                self.table.quoted()
            );
        }

        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT COUNT(*) FROM (SELECT {cols} FROM {table} FORCE INDEX ({index}) \
             ORDER BY {cols} LIMIT ? OFFSET ?) AS page_window",
            cols = columns,
            table = self.table.quoted(),
            index = quote_ident(&self.index_name),
        )
    }
}

/// Average entries per page given table statistics. Never returns zero.
pub fn estimate_rows_per_page(rows: u64, bytes: u64, page_size: u64) -> u64 {
    let pages = (bytes / page_size.max(1)).max(1);
    (rows / pages).max(1)
}

type ProfileKey = (QualifiedTable, String);

/// Caches index profiles for the lifetime of a connection. Missing
/// objects are cached too, so a dropped table costs one lookup per run.
pub struct PageLocator {
    page_size: u64,
    profiles: RwLock<HashMap<ProfileKey, Option<Arc<IndexProfile>>>>,
}

impl PageLocator {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Profile for `index_name` on `table`, `None` when either is gone.
    pub async fn profile(
        &self,
        pool: &MySqlPool,
        table: &QualifiedTable,
        index_name: &str,
    ) -> Result<Option<Arc<IndexProfile>>> {
        let key = (table.clone(), index_name.to_string());
        if let Some(cached) = self.profiles.read().await.get(&key) {
            return Ok(cached.clone());
        }

        let loaded = self.load(pool, table, index_name).await?.map(Arc::new);
        self.profiles.write().await.insert(key, loaded.clone());
        Ok(loaded)
    }

    async fn load(
        &self,
        pool: &MySqlPool,
        table: &QualifiedTable,
        index_name: &str,
    ) -> Result<Option<IndexProfile>> {
        let stats = sqlx::query(queries::TABLE_STATS)
            .bind(&table.schema)
            .bind(&table.table)
            .fetch_optional(pool)
            .await
            .map_err(map_query_error)?;
        let Some(stats) = stats else {
            debug!(table = %table, "Table no longer exists");
            return Ok(None);
        };

        let rows: Option<u64> = stats.try_get(0).map_err(map_query_error)?;
        let data_length: Option<u64> = stats.try_get(1).map_err(map_query_error)?;
        let index_length: Option<u64> = stats.try_get(2).map_err(map_query_error)?;

        let columns = if index_name == IMPLICIT_CLUSTERED_INDEX {
            Vec::new()
        } else {
            let rows = sqlx::query(queries::INDEX_COLUMNS)
                .bind(&table.schema)
                .bind(&table.table)
                .bind(index_name)
                .fetch_all(pool)
                .await
                .map_err(map_query_error)?;
            let columns = rows
                .iter()
                .map(|r| r.try_get::<String, _>(0))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_query_error)?;
            if columns.is_empty() {
                debug!(table = %table, index = %index_name, "Index no longer exists");
                return Ok(None);
            }
            columns
        };

        let clustered = index_name == "PRIMARY" || index_name == IMPLICIT_CLUSTERED_INDEX;
        let bytes = if clustered { data_length } else { index_length };
        let rows_per_page =
            estimate_rows_per_page(rows.unwrap_or(0), bytes.unwrap_or(0), self.page_size);

        Ok(Some(IndexProfile {
            table: table.clone(),
            index_name: index_name.to_string(),
            columns,
            rows_per_page,
        }))
    }
}
