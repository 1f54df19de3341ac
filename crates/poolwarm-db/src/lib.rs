//! MySQL/InnoDB adapter for poolwarm.
//!
//! Implements the [`Connector`] and [`ServerConnection`] ports on top of an
//! sqlx MySQL pool: buffer pool introspection, status counters and the
//! targeted reads that pull pages back into the buffer pool.

pub mod classify;
pub mod locator;
pub mod names;
pub mod queries;

pub use locator::{IndexProfile, PageLocator};
pub use names::QualifiedTable;

use async_trait::async_trait;
use classify::{
    error_number, is_introspection_refused, is_missing_object, map_connect_error, map_query_error,
};
use poolwarm_core::ports::{Connector, ServerConnection};
use poolwarm_core::{EngineConfig, Error, FetchOutcome, PageDescriptor, Result, ServerStatus};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{MySqlPool, Row};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// InnoDB's default page size, used when the server does not report one.
pub const DEFAULT_PAGE_SIZE: u64 = 16384;

/// Opens [`MySqlServer`] connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, config: &EngineConfig) -> Result<Arc<dyn ServerConnection>> {
        Ok(Arc::new(MySqlServer::connect(config).await?))
    }
}

/// A pooled connection to one MySQL server.
pub struct MySqlServer {
    pool: MySqlPool,
    locator: PageLocator,
}

impl MySqlServer {
    /// Connect to the server. The pool holds one connection per concurrent
    /// page fetch.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let conn = &config.connection;
        let mut options = MySqlConnectOptions::new()
            .host(&conn.host)
            .port(conn.port)
            .username(&conn.user);
        if let Some(password) = &conn.password {
            options = options.password(password);
        }
        if let Some(database) = &conn.database {
            options = options.database(database);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.fetch_concurrency.max(1) as u32)
            .acquire_timeout(config.network_timeout)
            .connect_with(options)
            .await
            .map_err(map_connect_error)?;

        let page_size = match Self::innodb_page_size(&pool).await {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "Could not read innodb_page_size, assuming default");
                DEFAULT_PAGE_SIZE
            }
        };

        info!(target = %conn.display_target(), page_size, "Connected to MySQL");
        Ok(Self::from_pool(pool, page_size))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool, page_size: u64) -> Self {
        Self {
            pool,
            locator: PageLocator::new(page_size),
        }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn innodb_page_size(pool: &MySqlPool) -> Result<u64> {
        let row = sqlx::query(queries::INNODB_PAGE_SIZE)
            .fetch_one(pool)
            .await
            .map_err(map_query_error)?;
        decode_unsigned(&row, 0)
    }

    fn row_to_page(r: &MySqlRow) -> Result<PageDescriptor> {
        let space_id = decode_unsigned(r, 2)?;
        let page_number = decode_unsigned(r, 3)?;
        Ok(PageDescriptor {
            table_name: r.try_get(0).map_err(map_query_error)?,
            index_name: r.try_get(1).map_err(map_query_error)?,
            space_id: u32::try_from(space_id)
                .map_err(|_| Error::Query(format!("space id out of range: {}", space_id)))?,
            page_number: u32::try_from(page_number)
                .map_err(|_| Error::Query(format!("page number out of range: {}", page_number)))?,
        })
    }
}

#[async_trait]
impl ServerConnection for MySqlServer {
    async fn server_version(&self) -> Result<String> {
        let row = sqlx::query(queries::SERVER_VERSION)
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_error)?;
        row.try_get(0).map_err(map_query_error)
    }

    async fn status(&self) -> Result<ServerStatus> {
        let rows = sqlx::query(queries::INNODB_STATUS)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;

        let mut status = ServerStatus::default();
        for r in &rows {
            let name: String = r.try_get(0).map_err(map_query_error)?;
            let value: String = r.try_get(1).map_err(map_query_error)?;
            // Non-numeric counters (e.g. Innodb_buffer_pool_dump_status) are skipped.
            if let Ok(value) = value.trim().parse::<u64>() {
                status.set(&name, value);
            }
        }
        Ok(status)
    }

    async fn buffer_pool_pages(&self) -> Result<Vec<PageDescriptor>> {
        let rows = sqlx::query(queries::BUFFER_POOL_PAGES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| match error_number(&e) {
                Some(code) if is_introspection_refused(code) => {
                    Error::IntrospectionUnavailable(e.to_string())
                }
                _ => map_query_error(e),
            })?;

        let pages = rows
            .iter()
            .map(Self::row_to_page)
            .collect::<Result<Vec<_>>>()?;
        debug!(pages = pages.len(), "Read buffer pool LRU");
        Ok(pages)
    }

    async fn fetch_page(&self, page: &PageDescriptor) -> Result<FetchOutcome> {
        let Some(table) = QualifiedTable::parse(&page.table_name) else {
            debug!(table = %page.table_name, "Unparseable table name, treating as missing");
            return Ok(FetchOutcome::MissingObject);
        };

        let profile = match self
            .locator
            .profile(&self.pool, &table, &page.index_name)
            .await?
        {
            Some(profile) => profile,
            None => return Ok(FetchOutcome::MissingObject),
        };

        let sql = profile.fetch_sql();
        let result = sqlx::query(&sql)
            .bind(profile.rows_per_page)
            .bind(profile.window_offset(page.page_number))
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(FetchOutcome::Fetched),
            Err(e) => match error_number(&e) {
                Some(code) if is_missing_object(code) => Ok(FetchOutcome::MissingObject),
                _ => Err(map_query_error(e)),
            },
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("MySQL pool closed");
    }
}

/// Read an unsigned integer column, whichever integer type the server
/// chose to report it as.
fn decode_unsigned(row: &MySqlRow, index: usize) -> Result<u64> {
    if let Ok(value) = row.try_get::<u64, _>(index) {
        return Ok(value);
    }
    let value: i64 = row.try_get(index).map_err(map_query_error)?;
    u64::try_from(value).map_err(|_| Error::Query(format!("negative value in column {}", index)))
}
