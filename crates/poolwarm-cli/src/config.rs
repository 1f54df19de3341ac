//! CLI configuration management.
//!
//! Settings resolve as command-line flag, then config file, then built-in
//! default.

use crate::commands::ConnectionArgs;
use anyhow::{Context, Result};
use poolwarm_core::{ConnectionOptions, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_IMAGE_FILE: &str = "poolwarm.img";

/// Contents of the optional YAML config file. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Image format used by `save`.
    pub format: Option<String>,
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    /// Image file used when `--file` is not given.
    pub file: Option<PathBuf>,
}

impl CliConfig {
    /// Load `explicit` if given, otherwise the per-user config file if it
    /// exists. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Per-user config file location.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "poolwarm", "poolwarm")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Overlay connection flags given on the command line.
    pub fn apply_connection_args(&mut self, args: &ConnectionArgs) {
        overlay(&mut self.host, &args.host);
        overlay(&mut self.port, &args.port);
        overlay(&mut self.user, &args.user);
        overlay(&mut self.password, &args.password);
        overlay(&mut self.database, &args.database);
        overlay(&mut self.timeout_secs, &args.timeout);
    }

    pub fn image_file(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_FILE))
    }

    /// Build the engine configuration, filling gaps with defaults.
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let mut connection = ConnectionOptions::default();
        overlay_value(&mut connection.host, &self.host);
        overlay_value(&mut connection.port, &self.port);
        overlay_value(&mut connection.user, &self.user);
        connection.password = self.password.clone();
        connection.database = self.database.clone();

        EngineConfig {
            image_format: self.format.clone().unwrap_or(defaults.image_format),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            fetch_concurrency: self.concurrency.unwrap_or(defaults.fetch_concurrency),
            network_timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.network_timeout),
            connection,
        }
    }
}

/// Replace `slot` with `flag` when the flag was given.
pub fn overlay<T: Clone>(slot: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        slot.clone_from(flag);
    }
}

fn overlay_value<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_without_file_or_flags() {
        let engine = CliConfig::default().engine_config();
        assert_eq!(engine.connection.host, "localhost");
        assert_eq!(engine.connection.port, 3306);
        assert_eq!(engine.connection.user, "root");
        assert_eq!(engine.image_format, "json");
        assert_eq!(engine.batch_size, 1000);
        assert_eq!(engine.fetch_concurrency, 4);
        assert_eq!(engine.network_timeout, Duration::from_secs(30));
        assert_eq!(CliConfig::default().image_file(), PathBuf::from("poolwarm.img"));
    }

    #[test]
    fn test_flag_beats_file_beats_default() {
        let mut config = CliConfig::from_yaml(
            "host: db.internal\nport: 3307\nbatch_size: 250\nformat: sqlite\n",
        )
        .unwrap();
        config.apply_connection_args(&ConnectionArgs {
            host: Some("replica".into()),
            timeout: Some(5),
            ..Default::default()
        });

        let engine = config.engine_config();
        assert_eq!(engine.connection.host, "replica");
        assert_eq!(engine.connection.port, 3307);
        assert_eq!(engine.connection.user, "root");
        assert_eq!(engine.batch_size, 250);
        assert_eq!(engine.image_format, "sqlite");
        assert_eq!(engine.network_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(CliConfig::from_yaml("hots: typo\n").is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(CliConfig::from_yaml("\n").unwrap(), CliConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("nope.yaml"))).is_err());

        let path = dir.path().join("poolwarm.yaml");
        std::fs::write(&path, "user: warmer\nconcurrency: 8\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.user.as_deref(), Some("warmer"));
        assert_eq!(config.concurrency, Some(8));
    }
}
