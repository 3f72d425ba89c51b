//! Tidings configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TidingsError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TidingsConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
}

impl Default for TidingsConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            gateway: GatewayConfig::default(),
            payment: PaymentConfig::default(),
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the tick loop checks for due jobs (seconds).
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Worker pool size for job execution.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Max simultaneous runs of the same job.
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
    /// Fallback zone when a schedule carries no usable timezone.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Job store database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_tick_secs() -> u64 { 5 }
fn default_workers() -> usize { 10 }
fn default_max_instances() -> usize { 3 }
fn default_timezone() -> String { "Asia/Shanghai".into() }
fn default_db_path() -> String { "~/.tidings/scheduler.db".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            workers: default_workers(),
            max_instances: default_max_instances(),
            default_timezone: default_timezone(),
            db_path: default_db_path(),
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8000 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Payment / paywall settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Receiver wallet (base58 pubkey) for issued challenges.
    #[serde(default)]
    pub receiver_address: String,
    /// Price of the gated resource in SOL.
    #[serde(default = "default_price_sol")]
    pub price_sol: f64,
    /// Per-payment budget ceiling in SOL.
    #[serde(default = "default_budget_sol")]
    pub budget_limit_sol: f64,
    /// Solana JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

fn default_price_sol() -> f64 { 0.01 }
fn default_budget_sol() -> f64 { 0.05 }
fn default_rpc_url() -> String { "https://api.devnet.solana.com".into() }

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            receiver_address: String::new(),
            price_sol: default_price_sol(),
            budget_limit_sol: default_budget_sol(),
            rpc_url: default_rpc_url(),
        }
    }
}

impl TidingsConfig {
    /// Load config from the default path (~/.tidings/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TidingsError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TidingsError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TidingsError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Tidings home directory (~/.tidings).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tidings")
    }
}
