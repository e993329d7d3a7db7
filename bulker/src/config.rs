use std::{fs, path::Path, time::Duration};

use alloy_core::primitives::{Address, U256};
use serde::Deserialize;

/// Number of tracked non-fungible ids the scenario moves around.
pub const TRACKED_TOKEN_IDS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc_url: String,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_gas_limit_multiplier_percent")]
    pub gas_limit_multiplier_percent: u64,
    pub deployment: Deployment,
    #[serde(default)]
    pub scenario: ScenarioParams,
}

/// Addresses of the fixed deployment the engine drives.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub bulk_transfer: Address,
    pub token: Address,
    pub nft: Address,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScenarioParams {
    #[serde(default = "default_fungible_amount")]
    pub fungible_amount: u64,
    #[serde(default = "default_token_ids")]
    pub token_ids: Vec<u64>,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            fungible_amount: default_fungible_amount(),
            token_ids: default_token_ids(),
        }
    }
}

impl ScenarioParams {
    pub fn amount(&self) -> U256 {
        U256::from(self.fungible_amount)
    }

    pub fn tracked_ids(&self) -> Vec<U256> {
        self.token_ids.iter().copied().map(U256::from).collect()
    }
}

/// Knobs of the transaction submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSettings {
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    pub gas_limit_multiplier_percent: u64,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Self {
            receipt_timeout: Duration::from_secs(default_receipt_timeout_secs()),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            gas_limit_multiplier_percent: default_gas_limit_multiplier_percent(),
        }
    }
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_gas_limit_multiplier_percent() -> u64 {
    120
}

fn default_fungible_amount() -> u64 {
    1
}

fn default_token_ids() -> Vec<u64> {
    (1..=TRACKED_TOKEN_IDS as u64).collect()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_string = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&config_string)
    }

    pub fn parse(config_string: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_string)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ids = &self.scenario.token_ids;
        if ids.len() != TRACKED_TOKEN_IDS {
            return Err(ConfigError::Invalid(format!(
                "expected {TRACKED_TOKEN_IDS} token ids, got {}",
                ids.len()
            )));
        }
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != ids.len() {
            return Err(ConfigError::Invalid("token ids must be distinct".into()));
        }
        if self.receipt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "receipt_timeout_secs must be positive".into(),
            ));
        }
        if self.gas_limit_multiplier_percent < 100 {
            return Err(ConfigError::Invalid(
                "gas_limit_multiplier_percent must be at least 100".into(),
            ));
        }
        Ok(())
    }

    pub fn submit_settings(&self) -> SubmitSettings {
        SubmitSettings {
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            gas_limit_multiplier_percent: self.gas_limit_multiplier_percent,
        }
    }
}
