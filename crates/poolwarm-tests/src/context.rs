//! Test context backed by a real MySQL server.

use crate::containers::MySqlContainer;
use poolwarm_core::{ConnectionOptions, EngineConfig};
use sqlx::MySqlPool;
use std::time::Duration;

/// Rows inserted into each sample table, enough to span several pages.
pub const SAMPLE_ROWS: usize = 2000;

/// A running MySQL container with a populated `test` schema.
///
/// Drop this to stop the container.
pub struct MySqlContext {
    pub mysql: MySqlContainer,
    pub pool: MySqlPool,
}

impl MySqlContext {
    pub async fn new() -> anyhow::Result<Self> {
        crate::init_test_logging();

        let mysql = MySqlContainer::start().await?;
        let pool = MySqlPool::connect(&mysql.connection_string()).await?;
        let ctx = Self { mysql, pool };
        ctx.seed().await?;
        Ok(ctx)
    }

    async fn seed(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE orders (\
                id INT PRIMARY KEY AUTO_INCREMENT, \
                customer_id INT NOT NULL, \
                note VARCHAR(255) NOT NULL, \
                KEY idx_customer (customer_id)) ENGINE=InnoDB",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE TABLE audit (message VARCHAR(255) NOT NULL) ENGINE=InnoDB")
            .execute(&self.pool)
            .await?;

        for chunk in (0..SAMPLE_ROWS).collect::<Vec<_>>().chunks(500) {
            let mut insert = sqlx::QueryBuilder::new("INSERT INTO orders (customer_id, note) ");
            insert.push_values(chunk, |mut row, i| {
                row.push_bind((*i % 97) as i32)
                    .push_bind(format!("order {:06} {}", i, "x".repeat(150)));
            });
            insert.build().execute(&self.pool).await?;

            let mut insert = sqlx::QueryBuilder::new("INSERT INTO audit (message) ");
            insert.push_values(chunk, |mut row, i| {
                row.push_bind(format!("audit {:06} {}", i, "y".repeat(150)));
            });
            insert.build().execute(&self.pool).await?;
        }

        sqlx::query("ANALYZE TABLE orders, audit")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Touch every row so the sample tables are resident.
    pub async fn warm_sample_tables(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT COUNT(*), SUM(LENGTH(note)) FROM orders")
            .execute(&self.pool)
            .await?;
        sqlx::query("SELECT COUNT(*) FROM orders FORCE INDEX (idx_customer) WHERE customer_id >= 0")
            .execute(&self.pool)
            .await?;
        sqlx::query("SELECT COUNT(*), SUM(LENGTH(message)) FROM audit")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn engine_config(&self, format: &str) -> EngineConfig {
        let connection = ConnectionOptions::new(self.mysql.host(), "root")
            .with_port(self.mysql.port())
            .with_database("test");
        EngineConfig::new(connection)
            .with_image_format(format)
            .with_batch_size(64)
            .with_fetch_concurrency(4)
            .with_network_timeout(Duration::from_secs(30))
    }
}
