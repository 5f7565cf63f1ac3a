use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, ConfigError, File, FileFormat};
use ethers::types::U256;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub database: Option<DatabaseConfig>,
    pub chain: ChainConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub faucet: FaucetConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("DEVTOOLS_API_CONFIG")
            .unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("DEVTOOLS_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        if self.store.backend == StoreBackend::Postgres {
            let database = self
                .database
                .as_ref()
                .ok_or_else(|| anyhow!("[database] section is required for the postgres store"))?;
            assert!(!database.url.is_empty(), "Database URL must be specified");
        }
        self.explorer.ensure_bounds()?;
        self.faucet.ensure_bounds()?;
        self.captcha.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub request_timeout_ms: Option<u64>,
    /// Queried from the node with `eth_chainId` when absent.
    pub chain_id: Option<u64>,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(10_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "ExplorerConfig::default_recent_scan")]
    pub recent_transactions_scan_blocks: u64,
    #[serde(default = "ExplorerConfig::default_address_scan")]
    pub address_scan_blocks: u64,
}

impl ExplorerConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.recent_transactions_scan_blocks > 0,
            "Recent transaction scan must cover at least one block"
        );
        assert!(
            self.address_scan_blocks <= 10_000,
            "Address scan cap exceeds defensive limit"
        );
        assert!(
            self.address_scan_blocks >= self.recent_transactions_scan_blocks,
            "Address scan cap must be >= recent transaction scan cap"
        );
        Ok(())
    }

    const fn default_recent_scan() -> u64 {
        20
    }

    const fn default_address_scan() -> u64 {
        100
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            recent_transactions_scan_blocks: Self::default_recent_scan(),
            address_scan_blocks: Self::default_address_scan(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaucetConfig {
    /// Wei per disbursement, decimal.
    #[serde(default = "FaucetConfig::default_amount_wei")]
    pub amount_wei: String,
    #[serde(default = "FaucetConfig::default_gas_limit")]
    pub gas_limit: u64,
    /// Environment variable holding the faucet's hex private key.
    #[serde(default = "FaucetConfig::default_private_key_env")]
    pub private_key_env: String,
    #[serde(default = "FaucetConfig::default_reservation_ttl")]
    pub reservation_ttl_seconds: u64,
    #[serde(default = "FaucetConfig::default_log_retention")]
    pub log_retention_days: i64,
    #[serde(default = "FaucetConfig::default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl FaucetConfig {
    pub fn amount(&self) -> Result<U256> {
        let amount = U256::from_dec_str(&self.amount_wei)
            .map_err(|err| anyhow!("faucet.amount_wei is not a decimal integer: {err:?}"))?;
        if amount.is_zero() {
            return Err(anyhow!("faucet.amount_wei must be positive"));
        }
        Ok(amount)
    }

    pub fn reservation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reservation_ttl_seconds as i64)
    }

    pub fn log_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.log_retention_days)
    }

    pub fn sweep_interval(&self) -> Duration {
        assert!(
            self.sweep_interval_ms >= 1_000,
            "Sweep interval must be >= 1 second"
        );
        Duration::from_millis(self.sweep_interval_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        self.amount()?;
        assert!(self.gas_limit >= 21_000, "Gas limit below intrinsic transfer cost");
        assert!(self.gas_limit <= 1_000_000, "Gas limit exceeds defensive limit");
        assert!(
            !self.private_key_env.is_empty(),
            "Private key variable name must be set"
        );
        assert!(
            (10..=3_600).contains(&self.reservation_ttl_seconds),
            "Reservation TTL must be between 10 seconds and one hour"
        );
        assert!(
            (1..=90).contains(&self.log_retention_days),
            "Audit log retention must be between 1 and 90 days"
        );
        assert!(
            self.sweep_interval_ms >= 1_000,
            "Sweep interval must be >= 1 second"
        );
        Ok(())
    }

    fn default_amount_wei() -> String {
        "1000000000000000000".to_string()
    }

    const fn default_gas_limit() -> u64 {
        21_000
    }

    fn default_private_key_env() -> String {
        "FAUCET_PRIVATE_KEY".to_string()
    }

    const fn default_reservation_ttl() -> u64 {
        120
    }

    const fn default_log_retention() -> i64 {
        7
    }

    const fn default_sweep_interval() -> u64 {
        60_000
    }
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            amount_wei: Self::default_amount_wei(),
            gas_limit: Self::default_gas_limit(),
            private_key_env: Self::default_private_key_env(),
            reservation_ttl_seconds: Self::default_reservation_ttl(),
            log_retention_days: Self::default_log_retention(),
            sweep_interval_ms: Self::default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    #[serde(default = "CaptchaConfig::default_ttl")]
    pub challenge_ttl_seconds: u64,
    #[serde(default = "CaptchaConfig::default_capacity")]
    pub max_outstanding: u64,
}

impl CaptchaConfig {
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_seconds)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            (30..=3_600).contains(&self.challenge_ttl_seconds),
            "Challenge TTL must be between 30 seconds and one hour"
        );
        assert!(
            self.max_outstanding >= 100,
            "Challenge capacity must be at least 100"
        );
        Ok(())
    }

    const fn default_ttl() -> u64 {
        300
    }

    const fn default_capacity() -> u64 {
        10_000
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            challenge_ttl_seconds: Self::default_ttl(),
            max_outstanding: Self::default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub blocks_max_capacity: u64,
    pub transactions_max_capacity: u64,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.blocks_max_capacity >= 100,
            "Block cache capacity must be at least 100"
        );
        assert!(
            self.transactions_max_capacity >= 100,
            "Transaction cache capacity must be at least 100"
        );
        assert!(
            self.ttl_seconds <= 3_600,
            "Explorer cache TTL cannot exceed one hour"
        );
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            blocks_max_capacity: 1_000,
            transactions_max_capacity: 5_000,
            ttl_seconds: 30,
        }
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faucet_defaults_match_one_token_drip() {
        let faucet = FaucetConfig::default();
        assert_eq!(
            faucet.amount().unwrap(),
            U256::exp10(18),
            "default drip is one whole token"
        );
        assert_eq!(faucet.gas_limit, 21_000);
        assert_eq!(faucet.log_retention(), chrono::Duration::days(7));
        assert!(faucet.ensure_bounds().is_ok());
    }

    #[test]
    fn faucet_amount_must_be_positive_decimal() {
        let mut faucet = FaucetConfig::default();
        faucet.amount_wei = "0".to_string();
        assert!(faucet.amount().is_err());
        faucet.amount_wei = "0x10".to_string();
        assert!(faucet.amount().is_err());
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let settings = Config::builder()
            .add_source(File::from_str(
                r#"
                [server]
                port = 8080

                [store]
                backend = "memory"

                [chain]
                rpc_url = "https://dream-rpc.somnia.network"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: ApiConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.database.is_none());
        assert_eq!(config.explorer.address_scan_blocks, 100);
        assert_eq!(config.cache.ttl_seconds, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn postgres_store_requires_database_section() {
        let settings = Config::builder()
            .add_source(File::from_str(
                r#"
                [server]
                port = 8080

                [chain]
                rpc_url = "http://localhost:8545"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: ApiConfig = settings.try_deserialize().unwrap();
        assert!(config.validate().is_err());
    }
}
