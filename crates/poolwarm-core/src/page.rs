//! Buffer pool page descriptors and snapshot metadata.

use crate::status::ServerStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One page resident in the buffer pool at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// Owning table, as reported by the server (e.g. `` `shop`.`orders` ``).
    pub table_name: String,
    /// Owning index within the table.
    pub index_name: String,
    /// Tablespace identifier.
    pub space_id: u32,
    /// Page number within the tablespace.
    pub page_number: u32,
}

impl PageDescriptor {
    pub fn new(
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        space_id: u32,
        page_number: u32,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: index_name.into(),
            space_id,
            page_number,
        }
    }

    /// Physical identity of the page.
    pub fn key(&self) -> PageKey {
        PageKey {
            space_id: self.space_id,
            page_number: self.page_number,
        }
    }
}

impl fmt::Display for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) @ {}", self.table_name, self.index_name, self.key())
    }
}

/// `(space_id, page_number)`, unique within a well-formed page list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub space_id: u32,
    pub page_number: u32,
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space_id, self.page_number)
    }
}

/// First page whose key already appeared earlier in the list.
pub fn find_duplicate(pages: &[PageDescriptor]) -> Option<&PageDescriptor> {
    let mut seen = HashSet::with_capacity(pages.len());
    pages.iter().find(|page| !seen.insert(page.key()))
}

/// Drop repeated keys, keeping the first (highest priority) occurrence.
/// Returns the number of descriptors removed.
pub fn dedup_pages(pages: &mut Vec<PageDescriptor>) -> usize {
    let before = pages.len();
    let mut seen = HashSet::with_capacity(before);
    pages.retain(|page| seen.insert(page.key()));
    before - pages.len()
}

/// Descriptive header of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub captured_at: DateTime<Utc>,
    pub server_version: String,
    pub buffer_pool_pages_total: u64,
    pub buffer_pool_pages_data: u64,
    pub page_count: u64,
}

impl SnapshotMetadata {
    /// Metadata for a snapshot of `page_count` pages taken now.
    pub fn capture(server_version: impl Into<String>, status: &ServerStatus, page_count: u64) -> Self {
        Self {
            captured_at: Utc::now(),
            server_version: server_version.into(),
            buffer_pool_pages_total: status.pool_pages_total().unwrap_or(0),
            buffer_pool_pages_data: status.pool_pages_data().unwrap_or(0),
            page_count,
        }
    }

    /// Whether this snapshot holds more pages than `target` can cache.
    /// Unknown capacity is never reported as exceeded.
    pub fn exceeds_capacity(&self, target: &ServerStatus) -> bool {
        match target.pool_pages_total() {
            Some(total) => self.page_count > total,
            None => false,
        }
    }
}
