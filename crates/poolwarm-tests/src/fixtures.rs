//! Test fixtures for creating sample data.

use chrono::{TimeZone, Utc};
use poolwarm_core::{ConnectionOptions, EngineConfig, PageDescriptor, SnapshotMetadata};
use std::time::Duration;

/// Factory for page lists.
pub struct PageFixture;

impl PageFixture {
    /// `n` pages of one clustered index, consecutive page numbers.
    pub fn sequential(table: &str, space_id: u32, n: u32) -> Vec<PageDescriptor> {
        (0..n)
            .map(|i| PageDescriptor::new(table, "PRIMARY", space_id, 4 + i))
            .collect()
    }

    /// A realistic mixed list: clustered and secondary index pages of
    /// several tables, interleaved the way an LRU list would be.
    pub fn mixed(n: u32) -> Vec<PageDescriptor> {
        const TABLES: [(&str, &str, u32); 4] = [
            ("`shop`.`orders`", "PRIMARY", 21),
            ("`shop`.`orders`", "idx_customer", 21),
            ("`shop`.`customers`", "PRIMARY", 22),
            ("`shop`.`line_items`", "GEN_CLUST_INDEX", 23),
        ];
        (0..n)
            .map(|i| {
                let (table, index, space) = TABLES[(i % 4) as usize];
                PageDescriptor::new(table, index, space, 3 + i)
            })
            .collect()
    }

    /// The three-page list `[A, B, C]`, deliberately not sorted by any key.
    pub fn abc() -> Vec<PageDescriptor> {
        vec![
            PageDescriptor::new("`app`.`sessions`", "PRIMARY", 9, 812),
            PageDescriptor::new("`app`.`accounts`", "PRIMARY", 4, 17),
            PageDescriptor::new("`app`.`sessions`", "idx_expiry", 9, 40),
        ]
    }
}

/// Factory for snapshot metadata.
pub struct MetadataFixture;

impl MetadataFixture {
    pub fn for_pages(page_count: u64) -> SnapshotMetadata {
        SnapshotMetadata {
            captured_at: Utc.timestamp_opt(1_760_000_000, 123_456_789).single().unwrap_or_default(),
            server_version: "8.0.36".into(),
            buffer_pool_pages_total: 8192,
            buffer_pool_pages_data: page_count.max(1),
            page_count,
        }
    }
}

/// Engine configuration for the given backend with small batches and a
/// short timeout, suitable for tests.
pub fn engine_config(format: &str) -> EngineConfig {
    EngineConfig::new(ConnectionOptions::new("fake-host", "tester"))
        .with_image_format(format)
        .with_batch_size(4)
        .with_fetch_concurrency(2)
        .with_network_timeout(Duration::from_secs(5))
}

/// Every registered backend name.
pub fn all_formats() -> Vec<&'static str> {
    poolwarm_image::registry::names()
}
