//! Settlement configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::error::CoreError;

/// Full configuration for the settlement core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettlementConfig {
    /// Card-rail services, addressed by `name`.
    #[serde(default)]
    pub fiat: Vec<FiatServiceConfig>,

    /// Blockchain networks and the tokens accepted on each.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    /// Confirmation-depth polling policy for account-model chains.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Card processors with a concrete adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FiatServiceKind {
    #[default]
    Stripe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiatServiceConfig {
    /// Service name payments bind to.
    pub name: String,
    #[serde(default)]
    pub kind: FiatServiceKind,
    /// Secret API key, sent on every request by this service's adapter only.
    pub api_key: String,
    #[serde(default = "default_fiat_base_url")]
    pub base_url: String,
    /// Return URL handed to the processor for transfer (connected account) charges.
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Transaction model of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Account-model chain queried through an Etherscan-style explorer.
    Evm,
    /// UTXO chain queried through a Blockfrost-style indexer.
    Cardano,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Mainnet,
    Testnet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub kind: ChainKind,
    #[serde(default)]
    pub mode: NetworkMode,
    /// Explorer or indexer base URL.
    pub explorer: String,
    /// Contract address whose transfer history is scanned (EVM only).
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    /// Contract address (EVM) or asset unit (Cardano, `lovelace` for ADA).
    pub address: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Blocks on top of a transfer before it counts as final (inclusive).
    #[serde(default = "default_min_depth")]
    pub min_depth: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound on the whole wait, whatever the attempt count.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_fiat_base_url() -> String {
    "https://api.stripe.com".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_min_depth() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    20
}
fn default_interval_ms() -> u64 {
    1_000
}
fn default_deadline_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            min_depth: default_min_depth(),
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl ConfirmationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SettlementConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: SettlementConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn fiat_service(&self, name: &str) -> Option<&FiatServiceConfig> {
        self.fiat.iter().find(|f| f.name == name)
    }
}

/// Install a global `tracing` subscriber honouring `RUST_LOG` first and the
/// configured level otherwise. A second call is a no-op.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }
}
