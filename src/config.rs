use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::constants::program_ids;
use crate::core::price::StaticUsdPrices;
use crate::types::PoolConfig;

/// Indexer settings, loaded from JSON with per-field defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerConfig {
    #[serde(default = "IndexerConfig::default_v1_program_id")]
    pub v1_program_id: String,
    #[serde(default = "IndexerConfig::default_v2_program_id")]
    pub v2_program_id: String,
    #[serde(default = "IndexerConfig::default_database_path")]
    pub database_path: String,
    #[serde(default = "IndexerConfig::default_pool_config_path")]
    pub pool_config_path: String,
    #[serde(default = "IndexerConfig::default_shard_count")]
    pub shard_count: u16,
    #[serde(default = "IndexerConfig::default_page_size")]
    pub page_size: usize,
    #[serde(default = "IndexerConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "IndexerConfig::default_pool_refresh_interval_ms")]
    pub pool_refresh_interval_ms: u64,
    #[serde(default = "IndexerConfig::default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "IndexerConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "IndexerConfig::default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "IndexerConfig::default_log_level")]
    pub log_level: String,
    /// Mint → USD price as a decimal string.
    #[serde(default)]
    pub usd_prices: HashMap<String, String>,
    /// Pools to index; empty means every configured pool.
    #[serde(default)]
    pub pools: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            v1_program_id: Self::default_v1_program_id(),
            v2_program_id: Self::default_v2_program_id(),
            database_path: Self::default_database_path(),
            pool_config_path: Self::default_pool_config_path(),
            shard_count: Self::default_shard_count(),
            page_size: Self::default_page_size(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            pool_refresh_interval_ms: Self::default_pool_refresh_interval_ms(),
            fetch_retries: Self::default_fetch_retries(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
            rpc_url: Self::default_rpc_url(),
            log_level: Self::default_log_level(),
            usd_prices: HashMap::new(),
            pools: Vec::new(),
        }
    }
}

impl IndexerConfig {
    fn default_v1_program_id() -> String {
        program_ids::CLMM_V1.to_string()
    }

    fn default_v2_program_id() -> String {
        program_ids::CLMM_V2.to_string()
    }

    fn default_database_path() -> String {
        "indexer.db".to_string()
    }

    fn default_pool_config_path() -> String {
        "pools.json".to_string()
    }

    const fn default_shard_count() -> u16 {
        4
    }

    const fn default_page_size() -> usize {
        200
    }

    const fn default_poll_interval_ms() -> u64 {
        1_000
    }

    const fn default_pool_refresh_interval_ms() -> u64 {
        60_000
    }

    const fn default_fetch_retries() -> u32 {
        3
    }

    const fn default_retry_backoff_ms() -> u64 {
        250
    }

    fn default_rpc_url() -> String {
        "https://api.mainnet-beta.solana.com".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Reads the file when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("INDEXER_DATABASE_PATH") {
            self.database_path = path;
        }
        if let Some(url) = lookup("SOLANA_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(level) = lookup("INDEXER_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn pool_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.pool_refresh_interval_ms.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn tracing_level(&self) -> tracing::Level {
        tracing::Level::from_str(&self.log_level).unwrap_or(tracing::Level::INFO)
    }

    pub fn usd_price_source(&self) -> Result<StaticUsdPrices> {
        let mut prices = HashMap::with_capacity(self.usd_prices.len());
        for (mint, value) in &self.usd_prices {
            let price = Decimal::from_str(value)
                .with_context(|| format!("invalid USD price {value} for {mint}"))?;
            prices.insert(mint.clone(), price);
        }
        Ok(StaticUsdPrices::new(prices))
    }

    /// Keeps only the pools named in `pools`, or everything when it is empty.
    pub fn select_pools<'a>(&self, configured: &'a [PoolConfig]) -> Vec<&'a PoolConfig> {
        configured
            .iter()
            .filter(|pool| self.pools.is_empty() || self.pools.contains(&pool.address))
            .collect()
    }
}

/// Reads the pool list, a JSON array of [`PoolConfig`].
pub fn load_pool_configs(path: &Path) -> Result<Vec<PoolConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pool config {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse pool config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::UsdPriceSource;

    #[test]
    fn missing_fields_take_defaults() {
        let config: IndexerConfig =
            serde_json::from_str(r#"{"pageSize": 10, "usdPrices": {"mint": "1.25"}}"#).unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.v1_program_id, program_ids::CLMM_V1);
        assert_eq!(
            config.usd_price_source().unwrap().usd_price("mint"),
            Decimal::from_str("1.25").ok()
        );
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config = IndexerConfig::default();
        config.apply_env_overrides(|key| match key {
            "INDEXER_DATABASE_PATH" => Some("/tmp/other.db".to_string()),
            "INDEXER_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.database_path, "/tmp/other.db");
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
        assert_eq!(config.rpc_url, IndexerConfig::default_rpc_url());
    }

    #[test]
    fn bad_usd_price_is_reported() {
        let config = IndexerConfig {
            usd_prices: HashMap::from([("mint".to_string(), "abc".to_string())]),
            ..IndexerConfig::default()
        };
        assert!(config.usd_price_source().is_err());
    }
}
