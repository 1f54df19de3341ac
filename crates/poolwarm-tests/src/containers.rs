//! Testcontainer configurations for integration tests.

use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::mysql::Mysql;

/// MySQL server with performance and information schema available.
pub struct MySqlContainer {
    #[allow(dead_code)] // Kept to maintain container lifetime
    container: ContainerAsync<Mysql>,
    host: String,
    port: u16,
}

impl MySqlContainer {
    pub async fn start() -> anyhow::Result<Self> {
        let container = Mysql::default().with_tag("8.0").start().await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(3306).await?;

        Ok(Self {
            container,
            host,
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The module's image runs with an empty root password and a `test`
    /// database.
    pub fn connection_string(&self) -> String {
        format!("mysql://root@{}:{}/test", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_mysql_container_starts() {
        let mysql = MySqlContainer::start().await.unwrap();
        assert!(mysql.connection_string().starts_with("mysql://root@"));
        assert!(mysql.port() > 0);
    }
}
