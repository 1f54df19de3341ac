//! In-crate fake server for unit tests.

use async_trait::async_trait;
use futures::stream;
use poolwarm_core::ports::{Connector, PageStream, ServerConnection};
use poolwarm_core::{
    EngineConfig, Error, FetchOutcome, PageDescriptor, PageKey, Result, ServerStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn pages(n: u32) -> Vec<PageDescriptor> {
    (0..n)
        .map(|i| PageDescriptor::new("`shop`.`orders`", "PRIMARY", 7, 100 + i))
        .collect()
}

pub fn page_stream(pages: Vec<PageDescriptor>) -> PageStream {
    Box::pin(stream::iter(pages.into_iter().map(Ok)))
}

#[derive(Default)]
pub struct ScriptedServer {
    resident: Mutex<Vec<PageDescriptor>>,
    missing_tables: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<PageKey>>,
    stalled: Mutex<HashSet<PageKey>>,
    fetches: AtomicU64,
    refuse_connect: AtomicBool,
    closed: AtomicBool,
}

impl ScriptedServer {
    pub fn with_resident(pages: Vec<PageDescriptor>) -> Self {
        let server = Self::default();
        *server.resident.lock().unwrap() = pages;
        server
    }

    pub fn mark_missing(&self, table: &str) {
        self.missing_tables.lock().unwrap().insert(table.to_string());
    }

    pub fn fail_page(&self, page: &PageDescriptor) {
        self.failing.lock().unwrap().insert(page.key());
    }

    pub fn stall_page(&self, page: &PageDescriptor) {
        self.stalled.lock().unwrap().insert(page.key());
    }

    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerConnection for ScriptedServer {
    async fn server_version(&self) -> Result<String> {
        Ok("8.0.36".into())
    }

    async fn status(&self) -> Result<ServerStatus> {
        let resident = self.resident.lock().unwrap().len() as u64;
        Ok(ServerStatus::from_counters([
            (ServerStatus::POOL_PAGES_TOTAL, 8192),
            (ServerStatus::POOL_PAGES_DATA, resident + self.fetch_count()),
            (ServerStatus::DATA_READ, self.fetch_count() * 16384),
        ]))
    }

    async fn buffer_pool_pages(&self) -> Result<Vec<PageDescriptor>> {
        Ok(self.resident.lock().unwrap().clone())
    }

    async fn fetch_page(&self, page: &PageDescriptor) -> Result<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let stalled = self.stalled.lock().unwrap().contains(&page.key());
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(&page.key()) {
            return Err(Error::Query("lock wait timeout exceeded".into()));
        }
        if self.missing_tables.lock().unwrap().contains(&page.table_name) {
            return Ok(FetchOutcome::MissingObject);
        }
        Ok(FetchOutcome::Fetched)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out the same scripted server on every connect.
pub struct ScriptedConnector {
    pub server: Arc<ScriptedServer>,
    pub connects: AtomicU64,
}

impl ScriptedConnector {
    pub fn new(server: Arc<ScriptedServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            connects: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _config: &EngineConfig) -> Result<Arc<dyn ServerConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.server.refuse_connect.load(Ordering::SeqCst) {
            return Err(Error::Connection("connection refused".into()));
        }
        Ok(self.server.clone())
    }
}
