//! Restore batch results and per-page fetch outcomes.

use crate::page::PageDescriptor;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a successful fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The read ran against the page's table and index.
    Fetched,
    /// The table or index no longer exists on the target server.
    MissingObject,
}

/// Why a page could not be brought back into the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    MissingObject,
    Timeout(Duration),
    Server(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::MissingObject => f.write_str("table or index no longer exists"),
            FetchFailure::Timeout(after) => write!(f, "timed out after {:?}", after),
            FetchFailure::Server(message) => write!(f, "server error: {}", message),
        }
    }
}

/// A per-page failure. Recorded in [`BatchResult::errors`], never
/// propagated out of a restore.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page}: {reason}")]
pub struct PageFetchError {
    pub page: PageDescriptor,
    pub reason: FetchFailure,
}

/// Result of one restore batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Zero-based position of the batch in the run.
    pub batch_index: usize,
    pub pages_attempted: u64,
    pub pages_fetched: u64,
    /// Failures in page-list order.
    pub errors: Vec<PageFetchError>,
}

impl BatchResult {
    pub fn pages_failed(&self) -> u64 {
        self.pages_attempted - self.pages_fetched
    }
}

/// Cumulative counters handed to the progress hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pages_fetched: u64,
    pub pages_attempted: u64,
    /// Pages the image declares, 0 when not known.
    pub pages_total: u64,
}

impl Progress {
    pub fn add(&mut self, batch: &BatchResult) {
        self.pages_fetched += batch.pages_fetched;
        self.pages_attempted += batch.pages_attempted;
    }
}
