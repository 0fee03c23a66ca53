//! Configuration for the gasless transfer pipeline
//!
//! Configuration can be loaded from a TOML file or from environment
//! variables (with `.env` support). Every field has a default, so an empty
//! file yields a working mainnet configuration against a local relay.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network RPC node
    #[serde(default)]
    pub network: NetworkConfig,

    /// Fee relay endpoint
    #[serde(default)]
    pub relay: RelayConfig,

    /// Compute-budget framing applied to every transaction
    #[serde(default)]
    pub compute_budget: ComputeBudgetConfig,

    /// Confirmation polling
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the network node
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// JSON-RPC endpoint of the relay
    #[serde(default = "default_relay_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport-level retries for read-only relay calls
    #[serde(default = "default_max_transport_retries")]
    pub max_transport_retries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBudgetConfig {
    /// Compute unit price in micro-lamports
    #[serde(default = "default_unit_price")]
    pub unit_price_micro_lamports: u64,

    /// Compute unit limit
    #[serde(default = "default_unit_limit")]
    pub unit_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Delay between signature status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed polls tolerated before giving up as unconfirmed
    #[serde(default = "default_max_poll_errors")]
    pub max_consecutive_poll_errors: u32,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_relay_url() -> String { "http://localhost:8080/".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_transport_retries() -> usize { 2 }
fn default_unit_price() -> u64 { 1_000_000 }
fn default_unit_limit() -> u32 { 200_000 }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_max_poll_errors() -> u32 { 10 }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            timeout_secs: default_timeout_secs(),
            max_transport_retries: default_max_transport_retries(),
        }
    }
}

impl Default for ComputeBudgetConfig {
    fn default() -> Self {
        Self {
            unit_price_micro_lamports: default_unit_price(),
            unit_limit: default_unit_limit(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_poll_errors: default_max_poll_errors(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            relay: RelayConfig::default(),
            compute_budget: ComputeBudgetConfig::default(),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables (`.env` honoured)
    ///
    /// Recognised variables: `SOLANA_RPC_URL`, `KORA_RPC_URL`,
    /// `COMPUTE_UNIT_PRICE`, `COMPUTE_UNIT_LIMIT`.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (environment or test map)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SOLANA_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Some(url) = lookup("KORA_RPC_URL") {
            self.relay.url = url;
        }
        if let Some(price) = lookup("COMPUTE_UNIT_PRICE") {
            self.compute_budget.unit_price_micro_lamports = price
                .parse()
                .map_err(|e| anyhow::anyhow!("COMPUTE_UNIT_PRICE '{}': {}", price, e))?;
        }
        if let Some(limit) = lookup("COMPUTE_UNIT_LIMIT") {
            self.compute_budget.unit_limit = limit
                .parse()
                .map_err(|e| anyhow::anyhow!("COMPUTE_UNIT_LIMIT '{}': {}", limit, e))?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.rpc_url.trim().is_empty() {
            anyhow::bail!("network.rpc_url must not be empty");
        }
        if self.relay.url.trim().is_empty() {
            anyhow::bail!("relay.url must not be empty");
        }
        if self.compute_budget.unit_limit == 0 {
            anyhow::bail!("compute_budget.unit_limit must be greater than zero");
        }
        if self.confirmation.poll_interval_ms == 0 {
            anyhow::bail!("confirmation.poll_interval_ms must be greater than zero");
        }
        if self.confirmation.max_consecutive_poll_errors == 0 {
            anyhow::bail!("confirmation.max_consecutive_poll_errors must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.compute_budget.unit_price_micro_lamports, 1_000_000);
        assert_eq!(config.compute_budget.unit_limit, 200_000);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [relay]
            url = "https://relay.example.com"

            [compute_budget]
            unit_limit = 300000
            "#,
        )
        .unwrap();
        assert_eq!(config.relay.url, "https://relay.example.com");
        assert_eq!(config.relay.max_transport_retries, 2);
        assert_eq!(config.compute_budget.unit_limit, 300_000);
        assert_eq!(config.compute_budget.unit_price_micro_lamports, 1_000_000);
    }

    #[test]
    fn test_validation_rejects_zero_limit() {
        let result = Config::from_toml_str("[compute_budget]\nunit_limit = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KORA_RPC_URL", "http://relay:9000"),
            ("COMPUTE_UNIT_PRICE", "5000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.relay.url, "http://relay:9000");
        assert_eq!(config.compute_budget.unit_price_micro_lamports, 5000);
        assert_eq!(config.network.rpc_url, "https://api.mainnet-beta.solana.com");

        let mut config = Config::default();
        let bad = config.apply_env_overrides(|k| {
            (k == "COMPUTE_UNIT_LIMIT").then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }
}
