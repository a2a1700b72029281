//! Deployment configuration
//!
//! Loaded once from a TOML file (default `~/.config/liquidator/config.toml`)
//! and passed by reference everywhere. The signing key never lives in the
//! file: only the name of the environment variable holding it does.

use alloy_primitives::{address, Address};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/liquidator/config.toml";

/// Multicall3 is deployed at the same address on every EVM chain
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub rpc_url: String,
    #[serde(default = "default_signing_key_env")]
    pub signing_key_env: String,
    #[serde(default = "default_cast_bin")]
    pub cast_bin: String,
    /// Extra attempts for failed reads
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Reads kept in flight per window
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Used to turn a day count into a block range
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,
    #[serde(default)]
    pub auction_layout: AuctionLayout,
    pub contracts: Contracts,
    #[serde(default)]
    pub markets: BTreeMap<String, MarketConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contracts {
    pub subaccounts: Address,
    pub cash: Address,
    pub auction: Address,
    pub auction_utils: Address,
    #[serde(default)]
    pub auction_utils_v2: Option<AuctionUtilsV2>,
    #[serde(default)]
    pub security_module: Option<Address>,
    #[serde(default = "default_multicall")]
    pub multicall: Address,
}

/// Replacement margin reader, valid from `activation_block` on
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuctionUtilsV2 {
    pub address: Address,
    pub activation_block: u64,
}

/// Field layout of the struct returned by `getAuction(uint256)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionLayout {
    #[default]
    Standard,
    /// Testnet deployments carry `percentageLeft` before `startTime`
    WithPercentageLeft,
}

/// Per-market addresses. `perp`, `option` and `spot_feed` may be left out
/// when `manager` is given; they are then read from the manager at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    #[serde(default)]
    pub manager: Option<Address>,
    #[serde(default)]
    pub base: Option<Address>,
    #[serde(default)]
    pub perp: Option<Address>,
    #[serde(default)]
    pub option: Option<Address>,
    #[serde(default)]
    pub spot_feed: Option<Address>,
}

fn default_signing_key_env() -> String {
    "SIGNING_KEY".to_string()
}

fn default_cast_bin() -> String {
    "cast".to_string()
}

fn default_retries() -> u32 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_block_time_secs() -> u64 {
    2
}

fn default_multicall() -> Address {
    MULTICALL3
}

impl Config {
    pub fn default_path() -> PathBuf {
        expand(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` (or the default location) and apply CLI overrides
    pub fn load(path: Option<&Path>, rpc_url: Option<String>) -> Result<Self> {
        let path = match path {
            Some(p) => expand(&p.to_string_lossy()),
            None => Self::default_path(),
        };

        let text = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config file: {}\n\
                 Copy liquidator.example.toml there or pass --config",
                path.display()
            )
        })?;

        let mut config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        if let Some(url) = rpc_url {
            config.rpc_url = url;
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.block_time_secs == 0 {
            anyhow::bail!("block_time_secs must be at least 1");
        }
        if self.rpc_url.trim().is_empty() {
            anyhow::bail!("rpc_url is empty");
        }
        Ok(())
    }

    /// Contract serving `getMM` for a read at `block` (`None` = latest)
    pub fn margin_contract(&self, block: Option<u64>) -> Address {
        match (&self.contracts.auction_utils_v2, block) {
            (Some(v2), Some(b)) if b < v2.activation_block => self.contracts.auction_utils,
            (Some(v2), _) => v2.address,
            (None, _) => self.contracts.auction_utils,
        }
    }

    /// Read the signing key from the configured environment variable
    pub fn signing_key(&self) -> Result<String> {
        std::env::var(&self.signing_key_env).with_context(|| {
            format!(
                "Signing key not found: set the {} environment variable",
                self.signing_key_env
            )
        })
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        rpc_url = "http://127.0.0.1:8545"

        [contracts]
        subaccounts = "0x1000000000000000000000000000000000000001"
        cash = "0x1000000000000000000000000000000000000002"
        auction = "0x1000000000000000000000000000000000000003"
        auction_utils = "0x1000000000000000000000000000000000000004"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.signing_key_env, "SIGNING_KEY");
        assert_eq!(config.retries, 5);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.block_time_secs, 2);
        assert_eq!(config.auction_layout, AuctionLayout::Standard);
        assert_eq!(config.contracts.multicall, MULTICALL3);
        assert!(config.markets.is_empty());
    }

    #[test]
    fn test_full_file_with_markets() {
        let text = format!(
            r#"{MINIMAL}
            auction_utils_v2 = {{ address = "0x2000000000000000000000000000000000000004", activation_block = 1000 }}

            [markets.ETH]
            manager = "0x3000000000000000000000000000000000000001"
            base = "0x3000000000000000000000000000000000000002"
            "#
        );
        let config = Config::from_toml(&text).unwrap();
        let eth = &config.markets["ETH"];
        assert!(eth.manager.is_some());
        assert!(eth.perp.is_none());

        let v1 = config.contracts.auction_utils;
        let v2: Address = "0x2000000000000000000000000000000000000004".parse().unwrap();
        assert_eq!(config.margin_contract(Some(999)), v1);
        assert_eq!(config.margin_contract(Some(1000)), v2);
        assert_eq!(config.margin_contract(None), v2);
    }

    #[test]
    fn test_testnet_layout_and_bad_values() {
        let text = format!("auction_layout = \"with_percentage_left\"\n{MINIMAL}");
        let config = Config::from_toml(&text).unwrap();
        assert_eq!(config.auction_layout, AuctionLayout::WithPercentageLeft);

        let text = format!("batch_size = 0\n{MINIMAL}");
        assert!(Config::from_toml(&text).is_err());

        let text = format!("unknown_key = 1\n{MINIMAL}");
        assert!(Config::from_toml(&text).is_err());
    }

    #[test]
    fn test_example_file_parses() {
        let text = include_str!("../../liquidator.example.toml");
        let config = Config::from_toml(text).unwrap();
        assert_eq!(config.markets.len(), 2);
        assert!(config.markets["BTC"].spot_feed.is_some());
        assert!(config.contracts.auction_utils_v2.is_none());
    }

    #[test]
    fn test_load_from_file_with_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load(Some(file.path()), Some("http://node:8545".to_string())).unwrap();
        assert_eq!(config.rpc_url, "http://node:8545");

        let missing = Config::load(Some(Path::new("/nonexistent/liquidator.toml")), None);
        assert!(missing.unwrap_err().to_string().contains("Failed to read config file"));
    }
}
