//! Integration test infrastructure for poolwarm.
//!
//! [`FakeServer`] stands in for a database server in engine tests. The
//! [`context::MySqlContext`] starts a real MySQL server through
//! testcontainers for the tests behind the `integration` feature.
//!
//! # Usage
//!
//! ```ignore
//! use poolwarm_tests::{FakeConnector, FakeServer, PageFixture};
//!
//! let server = Arc::new(FakeServer::new().with_resident(PageFixture::mixed(10)));
//! let connector = FakeConnector::new(server);
//! ```

pub mod containers;
pub mod context;
pub mod fake;
pub mod fixtures;

pub use fake::{FakeConnector, FakeServer};
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,poolwarm_engine=debug")),
        )
        .with_test_writer()
        .try_init();
}
