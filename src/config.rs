//! Configuration management for the swap core
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Every field has a default, so a file only needs the values it changes.

use crate::tx::validation;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "STELLAR_SWAP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: NetworkConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub lifecycle: LifecycleConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub passphrase: String,
    /// Account used as the source of read-only simulations
    pub simulation_source: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            passphrase: "Test SDF Network ; September 2015".to_string(),
            simulation_source: "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub contract_id: String,
    pub token_a: String,
    pub token_b: String,
    /// Used when the pool has not reported its fee
    pub default_fee_bps: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            contract_id: String::new(),
            token_a: String::new(),
            token_b: String::new(),
            default_fee_bps: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub balance_ttl_secs: u64,
    pub reserves_ttl_secs: u64,
    pub fee_ttl_secs: u64,
    pub shares_ttl_secs: u64,
    pub events_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30,
            sweep_interval_secs: 60,
            balance_ttl_secs: 15,
            reserves_ttl_secs: 10,
            fee_ttl_secs: 300,
            shares_ttl_secs: 15,
            events_ttl_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    /// Native stroops kept back when checking a payment against the balance
    pub native_reserve_stroops: i64,
    pub log_capacity: usize,
    pub default_slippage_percent: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 30,
            poll_interval_ms: 2_000,
            native_reserve_stroops: 15_000_000,
            log_capacity: 50,
            default_slippage_percent: 0.5,
        }
    }
}

impl LifecycleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `STELLAR_SWAP_CONFIG`, or the
    /// default path
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_file(&config_path)
    }

    /// Load and validate settings from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !validation::is_valid_contract(&self.pool.contract_id) {
            anyhow::bail!("pool.contract_id is not a valid contract address: {:?}", self.pool.contract_id);
        }
        for (name, token) in [("token_a", &self.pool.token_a), ("token_b", &self.pool.token_b)] {
            if !validation::is_valid_contract(token) {
                anyhow::bail!("pool.{} is not a valid contract address: {:?}", name, token);
            }
        }
        if self.pool.token_a == self.pool.token_b {
            anyhow::bail!("pool.token_a and pool.token_b must differ");
        }
        if self.pool.default_fee_bps >= 10_000 {
            anyhow::bail!("pool.default_fee_bps must be below 10000");
        }
        if !validation::is_valid_account(&self.network.simulation_source) {
            anyhow::bail!("network.simulation_source is not a valid account address");
        }
        if self.network.passphrase.is_empty() {
            anyhow::bail!("network.passphrase must be set");
        }
        if self.lifecycle.poll_attempts == 0 {
            anyhow::bail!("lifecycle.poll_attempts must be at least 1");
        }
        if self.lifecycle.log_capacity == 0 {
            anyhow::bail!("lifecycle.log_capacity must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.lifecycle.default_slippage_percent) {
            anyhow::bail!("lifecycle.default_slippage_percent must be within 0..=100");
        }
        if self.cache.sweep_interval_secs == 0 {
            tracing::warn!("cache.sweep_interval_secs is 0 - expired entries are only dropped on read");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").context("Invalid substitution pattern")?;

    let result = re.replace_all(input, |cap: &regex::Captures| {
        env::var(&cap[1]).unwrap_or_default()
    });

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POOL: &str = "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4";
    const TOKEN_A: &str = "CADQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQP5KR";

    fn token_b() -> String {
        validation::encode_contract(&[9u8; 32])
    }

    fn minimal_toml() -> String {
        format!(
            "[pool]\ncontract_id = \"{}\"\ntoken_a = \"{}\"\ntoken_b = \"{}\"\n",
            POOL,
            TOKEN_A,
            token_b()
        )
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("STELLAR_SWAP_TEST_VAR", "test_value");
        let input = "url = \"https://rpc.example.com/${STELLAR_SWAP_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"https://rpc.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let settings = Settings::from_toml_str(&minimal_toml()).unwrap();
        assert_eq!(settings.pool.default_fee_bps, 30);
        assert_eq!(settings.lifecycle.poll_attempts, 30);
        assert_eq!(settings.lifecycle.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.lifecycle.log_capacity, 50);
        assert_eq!(settings.cache.default_ttl(), Duration::from_secs(30));
        assert_eq!(settings.api.port, 8080);
    }

    #[test]
    fn test_load_from_file_with_substitution() {
        env::set_var("STELLAR_SWAP_TEST_POOL", POOL);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[network]\npassphrase = \"Public Global Stellar Network ; September 2015\"\n\n\
             [pool]\ncontract_id = \"${{STELLAR_SWAP_TEST_POOL}}\"\ntoken_a = \"{}\"\ntoken_b = \"{}\"\n\n\
             [lifecycle]\npoll_attempts = 5\n",
            TOKEN_A,
            token_b()
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.pool.contract_id, POOL);
        assert_eq!(settings.lifecycle.poll_attempts, 5);
        assert!(settings.network.passphrase.starts_with("Public"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Settings::from_file(Path::new("/nonexistent/stellar-swap.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("stellar-swap.toml"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_pool = minimal_toml().replace(POOL, "GNOTACONTRACT");
        assert!(Settings::from_toml_str(&bad_pool).is_err());

        let high_fee = format!("{}default_fee_bps = 10000\n", minimal_toml());
        assert!(Settings::from_toml_str(&high_fee).is_err());

        let zero_polls = format!("{}\n[lifecycle]\npoll_attempts = 0\n", minimal_toml());
        assert!(Settings::from_toml_str(&zero_polls).is_err());

        let zero_log = format!("{}\n[lifecycle]\nlog_capacity = 0\n", minimal_toml());
        assert!(Settings::from_toml_str(&zero_log).is_err());
    }
}
