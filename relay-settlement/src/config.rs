//! Configuration for relay settlement

use serde::{Deserialize, Serialize};

/// Relay node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Pool configuration
    pub pool: pool_core::Config,

    /// Hex seed of the relayer signing key; a fresh key is generated when unset
    pub relayer_seed: Option<String>,

    /// Retry configuration
    pub retry: RetryConfig,

    /// Pools settled concurrently within one batch
    pub batch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "relay-node".to_string(),
            pool: pool_core::Config::default(),
            relayer_seed: None,
            retry: RetryConfig::default(),
            batch_concurrency: 8,
        }
    }
}

/// Retry configuration for transient pool failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per instruction, including the first
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), doubling up to the cap
    pub fn backoff(&self, retry: u32) -> std::time::Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let millis = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        std::time::Duration::from_millis(millis)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.apply_env()?;
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
        self.pool.apply_env()?;

        if let Ok(seed) = std::env::var("RELAY_SEED") {
            self.relayer_seed = Some(seed);
        }

        if let Ok(concurrency) = std::env::var("RELAY_BATCH_CONCURRENCY") {
            self.batch_concurrency = concurrency
                .parse()
                .map_err(|e| crate::Error::Config(format!("RELAY_BATCH_CONCURRENCY: {}", e)))?;
        }

        if let Ok(attempts) = std::env::var("RELAY_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts
                .parse()
                .map_err(|e| crate::Error::Config(format!("RELAY_MAX_ATTEMPTS: {}", e)))?;
        }

        self.validate()
    }

    /// Check values are usable
    pub fn validate(&self) -> crate::Result<()> {
        self.pool.validate()?;
        if self.batch_concurrency == 0 {
            return Err(crate::Error::Config("batch_concurrency must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config("retry.max_attempts must be positive".to_string()));
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
        assert_eq!(config.batch_concurrency, 8);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.relayer_seed.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_nested_pool_section() {
        let config: Config = toml::from_str(
            r#"
            batch_concurrency = 2

            [pool]
            mailbox_capacity = 32

            [pool.nonce]
            max_pending_gaps = 100

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.pool.mailbox_capacity, 32);
        assert_eq!(config.pool.nonce.max_pending_gaps, Some(100));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 10);
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1).as_millis(), 10);
        assert_eq!(retry.backoff(2).as_millis(), 20);
        assert_eq!(retry.backoff(3).as_millis(), 40);
        assert_eq!(retry.backoff(40).as_millis(), 500);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = Config {
            batch_concurrency: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
