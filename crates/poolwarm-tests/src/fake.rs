//! Scriptable in-memory server implementing both server ports.

use async_trait::async_trait;
use poolwarm_core::ports::{Connector, ServerConnection};
use poolwarm_core::{
    EngineConfig, Error, FetchOutcome, PageDescriptor, PageKey, Result, ServerStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const PAGE_BYTES: u64 = 16 * 1024;

#[derive(Debug, Default)]
struct FakeState {
    resident: Vec<PageDescriptor>,
    missing_tables: HashSet<String>,
    failing_pages: HashSet<PageKey>,
    stalled_pages: HashSet<PageKey>,
    warmed: HashSet<PageKey>,
    fetch_log: Vec<PageDescriptor>,
    introspection_error: Option<String>,
}

/// A pretend InnoDB server.
///
/// Fetching a page marks it warm: the pool's data-page counter and the
/// bytes-read counter grow the way a real server's would.
#[derive(Debug)]
pub struct FakeServer {
    version: String,
    pool_pages_total: u64,
    state: Mutex<FakeState>,
    fetches: AtomicU64,
    closes: AtomicU64,
    stall: Duration,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            version: "8.0.36-fake".into(),
            pool_pages_total: 8192,
            state: Mutex::default(),
            fetches: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            stall: Duration::from_secs(3600),
        }
    }

    pub fn with_pool_pages(mut self, total: u64) -> Self {
        self.pool_pages_total = total;
        self
    }

    /// Pages the enumerator will see, in priority order.
    pub fn with_resident(self, pages: Vec<PageDescriptor>) -> Self {
        self.state().resident = pages;
        self
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Treat `table` as dropped: fetches report a missing object.
    pub fn drop_table(&self, table: &str) {
        self.state().missing_tables.insert(table.to_string());
    }

    /// Fail every fetch of `page` with a server error.
    pub fn fail_page(&self, page: &PageDescriptor) {
        self.state().failing_pages.insert(page.key());
    }

    /// Never answer a fetch of `page`.
    pub fn stall_page(&self, page: &PageDescriptor) {
        self.state().stalled_pages.insert(page.key());
    }

    /// Make buffer pool enumeration fail as if the table were unreadable.
    pub fn deny_introspection(&self, reason: &str) {
        self.state().introspection_error = Some(reason.to_string());
    }

    /// Forget which pages were warmed, as after a restart.
    pub fn restart(&self) {
        let mut state = self.state();
        state.warmed.clear();
        state.resident.clear();
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Every fetch call, in the order it reached the server.
    pub fn fetch_log(&self) -> Vec<PageDescriptor> {
        self.state().fetch_log.clone()
    }

    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerConnection for FakeServer {
    async fn server_version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    async fn status(&self) -> Result<ServerStatus> {
        let state = self.state();
        let warm_keys: HashSet<PageKey> = state
            .resident
            .iter()
            .map(PageDescriptor::key)
            .chain(state.warmed.iter().copied())
            .collect();
        let data_pages = (warm_keys.len() as u64).min(self.pool_pages_total);
        Ok(ServerStatus::from_counters([
            ("Innodb_buffer_pool_pages_total", self.pool_pages_total),
            ("Innodb_buffer_pool_pages_data", data_pages),
            ("Innodb_data_read", state.warmed.len() as u64 * PAGE_BYTES),
        ]))
    }

    async fn buffer_pool_pages(&self) -> Result<Vec<PageDescriptor>> {
        let state = self.state();
        match &state.introspection_error {
            Some(reason) => Err(Error::IntrospectionUnavailable(reason.clone())),
            None => Ok(state.resident.clone()),
        }
    }

    async fn fetch_page(&self, page: &PageDescriptor) -> Result<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let stalled = {
            let mut state = self.state();
            state.fetch_log.push(page.clone());
            state.stalled_pages.contains(&page.key())
        };
        if stalled {
            tokio::time::sleep(self.stall).await;
        }

        let mut state = self.state();
        if state.failing_pages.contains(&page.key()) {
            return Err(Error::Query("Lock wait timeout exceeded".into()));
        }
        if state.missing_tables.contains(&page.table_name) {
            return Ok(FetchOutcome::MissingObject);
        }
        state.warmed.insert(page.key());
        Ok(FetchOutcome::Fetched)
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connects to a shared [`FakeServer`].
#[derive(Debug)]
pub struct FakeConnector {
    server: Arc<FakeServer>,
    connects: AtomicU64,
    refuse: AtomicBool,
    last_config: Mutex<Option<EngineConfig>>,
}

impl FakeConnector {
    pub fn new(server: Arc<FakeServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            connects: AtomicU64::new(0),
            refuse: AtomicBool::new(false),
            last_config: Mutex::new(None),
        })
    }

    pub fn server(&self) -> &Arc<FakeServer> {
        &self.server
    }

    /// Fail every later connect attempt.
    pub fn go_offline(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Configuration passed to the most recent connect.
    pub fn last_config(&self) -> Option<EngineConfig> {
        match self.last_config.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, config: &EngineConfig) -> Result<Arc<dyn ServerConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_config.lock() {
            *last = Some(config.clone());
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!(
                "can't connect to {}",
                config.connection.display_target()
            )));
        }
        Ok(self.server.clone())
    }
}
