//! Server status counters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time snapshot of named server counters.
///
/// Counter names are stored lowercased so lookups do not depend on the
/// casing a server version happens to report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerStatus {
    counters: BTreeMap<String, u64>,
}

impl ServerStatus {
    pub const DATA_READ: &'static str = "innodb_data_read";
    pub const POOL_PAGES_TOTAL: &'static str = "innodb_buffer_pool_pages_total";
    pub const POOL_PAGES_DATA: &'static str = "innodb_buffer_pool_pages_data";

    /// Counters the engine reads for reporting and sizing.
    pub const TRACKED: [&'static str; 3] =
        [Self::DATA_READ, Self::POOL_PAGES_TOTAL, Self::POOL_PAGES_DATA];

    pub fn from_counters<I, K>(counters: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: AsRef<str>,
    {
        Self {
            counters: counters
                .into_iter()
                .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn set(&mut self, name: &str, value: u64) {
        self.counters.insert(name.to_ascii_lowercase(), value);
    }

    /// Bytes read from data files since server start.
    pub fn data_read(&self) -> Option<u64> {
        self.get(Self::DATA_READ)
    }

    /// Buffer pool capacity in pages.
    pub fn pool_pages_total(&self) -> Option<u64> {
        self.get(Self::POOL_PAGES_TOTAL)
    }

    /// Buffer pool pages holding data.
    pub fn pool_pages_data(&self) -> Option<u64> {
        self.get(Self::POOL_PAGES_DATA)
    }

    /// Fraction of the buffer pool holding data, in percent.
    pub fn occupancy_percent(&self) -> Option<f64> {
        match (self.pool_pages_data(), self.pool_pages_total()) {
            (Some(data), Some(total)) if total > 0 => Some(data as f64 * 100.0 / total as f64),
            _ => None,
        }
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let status = ServerStatus::from_counters([
            ("Innodb_buffer_pool_pages_total", 8192),
            ("Innodb_buffer_pool_pages_data", 2048),
            ("Innodb_data_read", 1_048_576),
        ]);

        assert_eq!(status.pool_pages_total(), Some(8192));
        assert_eq!(status.get("INNODB_DATA_READ"), Some(1_048_576));
        assert_eq!(status.occupancy_percent(), Some(25.0));
    }

    #[test]
    fn test_occupancy_needs_capacity() {
        let status = ServerStatus::from_counters([(ServerStatus::POOL_PAGES_DATA, 10)]);
        assert_eq!(status.occupancy_percent(), None);

        let empty = ServerStatus::from_counters([
            (ServerStatus::POOL_PAGES_DATA, 0),
            (ServerStatus::POOL_PAGES_TOTAL, 0),
        ]);
        assert_eq!(empty.occupancy_percent(), None);
    }
}
