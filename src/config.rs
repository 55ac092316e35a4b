use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub database: DatabaseConfig,
    pub chain_account_rpc: RpcConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default = "default_address_cache_capacity")]
    pub address_cache_capacity: usize,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

fn default_address_cache_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

/// Chain account service endpoint
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    pub max_batch_size: u64,
    /// Consecutive ahead-of-provider polls before alerting
    pub ahead_alert_threshold: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_batch_size: 100,
            ahead_alert_threshold: 3,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default = "default_network")]
    pub network: String,
    pub confirmations: u64,
    /// Resume after this height; genesis when absent
    #[serde(default)]
    pub start_height: Option<u64>,
}

fn default_network() -> String {
    crate::chain::DEFAULT_NETWORK.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifierConfig {
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        for chain in &config.chains {
            anyhow::ensure!(!chain.name.is_empty(), "chain name must not be empty");
        }
        anyhow::ensure!(
            config.sync.max_batch_size > 0,
            "sync.max_batch_size must be positive"
        );
        Ok(config)
    }
}
