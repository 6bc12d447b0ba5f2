//! Configuration for pool custody

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pool service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Snapshot directory
    pub data_dir: PathBuf,

    /// Per-pool actor mailbox capacity
    pub mailbox_capacity: usize,

    /// Event broadcast buffer (events)
    pub event_buffer: usize,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Nonce reconciliation configuration
    pub nonce: NonceConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "pool-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data/pools"),
            mailbox_capacity: 1024,
            event_buffer: 4096,
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            nonce: NonceConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Nonce reconciliation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NonceConfig {
    /// Maximum pending gaps per lane; `None` keeps gaps unbounded
    pub max_pending_gaps: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(data_dir) = std::env::var("POOL_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(capacity) = std::env::var("POOL_MAILBOX_CAPACITY") {
            self.mailbox_capacity = capacity
                .parse()
                .map_err(|e| crate::Error::Config(format!("POOL_MAILBOX_CAPACITY: {}", e)))?;
        }

        if let Ok(limit) = std::env::var("POOL_MAX_PENDING_GAPS") {
            self.nonce.max_pending_gaps = Some(
                limit
                    .parse()
                    .map_err(|e| crate::Error::Config(format!("POOL_MAX_PENDING_GAPS: {}", e)))?,
            );
        }

        if let Ok(json) = std::env::var("POOL_LOG_JSON") {
            self.log.json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        self.validate()
    }

    /// Check values are usable
    pub fn validate(&self) -> crate::Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config("mailbox_capacity must be positive".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(crate::Error::Config("event_buffer must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "pool-core");
        assert_eq!(config.mailbox_capacity, 1024);
        assert_eq!(config.nonce.max_pending_gaps, None);
        assert!(!config.log.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            mailbox_capacity = 16

            [nonce]
            max_pending_gaps = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.mailbox_capacity, 16);
        assert_eq!(config.nonce.max_pending_gaps, Some(500));
        assert_eq!(config.event_buffer, 4096);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_from_file_rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(&path, "mailbox_capacity = 0\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(crate::Error::Config(_))));
    }
}
