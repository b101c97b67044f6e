//! Client configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `RWA__*` environment variables (e.g. `RWA__DEFAULT_NETWORK=amoy`,
//! `RWA__SUPABASE__API_KEY=...`).

use crate::types::{Address, ZERO_ADDRESS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

/// Deployment of the loan contracts on one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// EVM chain id
    pub chain_id: u64,
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Loan manager contract
    #[serde(default = "zero_address")]
    pub loan_manager: Address,
    /// Default payment token (stablecoin) for new loans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_token: Option<Address>,
    /// Block explorer base URL, without trailing slash
    pub explorer_url: String,
}

fn zero_address() -> Address {
    ZERO_ADDRESS
}

/// Supabase (PostgREST) persistence endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. https://xyz.supabase.co
    pub url: String,
    /// Service or anon API key
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Network used when a call does not name one
    pub default_network: String,
    /// Decimals of the payment token amounts are quoted in
    pub payment_token_decimals: u32,
    /// Configured networks by name
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Persistence endpoint; the in-memory store is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase: Option<SupabaseConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                chain_id: 11_155_111,
                rpc_url: "https://rpc.sepolia.org".to_string(),
                loan_manager: ZERO_ADDRESS,
                payment_token: None,
                explorer_url: "https://sepolia.etherscan.io".to_string(),
            },
        );
        networks.insert(
            "amoy".to_string(),
            NetworkConfig {
                chain_id: 80_002,
                rpc_url: "https://rpc-amoy.polygon.technology".to_string(),
                loan_manager: ZERO_ADDRESS,
                payment_token: None,
                explorer_url: "https://amoy.polygonscan.com".to_string(),
            },
        );
        networks.insert(
            "arbitrum-sepolia".to_string(),
            NetworkConfig {
                chain_id: 421_614,
                rpc_url: "https://sepolia-rollup.arbitrum.io/rpc".to_string(),
                loan_manager: ZERO_ADDRESS,
                payment_token: None,
                explorer_url: "https://sepolia.arbiscan.io".to_string(),
            },
        );

        Self {
            default_network: "sepolia".to_string(),
            payment_token_decimals: 18,
            networks,
            supabase: None,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("RWA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?;

        settings.network(&settings.default_network)?;
        Ok(settings)
    }

    /// Look up a configured network by name
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }

    /// Names of all configured networks
    pub fn network_names(&self) -> Vec<String> {
        self.networks.keys().cloned().collect()
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the settings as a TOML file
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
