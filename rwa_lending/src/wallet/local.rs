use super::{WalletProvider, WalletSession};
use crate::config::Settings;
use crate::error::{LendingError, Result};
use crate::types::{format_address, Address};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use log::{info, warn};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Wallet backed by a local private key
pub struct LocalKeyWallet {
    key: LocalWallet,
    /// Chain id per configured network
    chains: HashMap<String, u64>,
    /// Network the wallet starts on when connecting
    default_network: String,
    session: RwLock<Option<WalletSession>>,
}

impl LocalKeyWallet {
    pub fn new(key: LocalWallet, settings: &Settings) -> Self {
        let chains = settings
            .networks
            .iter()
            .map(|(name, network)| (name.clone(), network.chain_id))
            .collect();
        Self {
            key,
            chains,
            default_network: settings.default_network.clone(),
            session: RwLock::new(None),
        }
    }

    /// Build from a hex private key (with or without 0x prefix)
    pub fn from_private_key(private_key: &str, settings: &Settings) -> Result<Self> {
        let key = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| LendingError::Wallet(format!("Invalid private key: {}", e)))?;
        Ok(Self::new(key, settings))
    }

    fn chain_id(&self, network: &str) -> Result<u64> {
        self.chains
            .get(network)
            .copied()
            .ok_or_else(|| LendingError::UnsupportedNetwork(network.to_string()))
    }
}

#[async_trait]
impl WalletProvider for LocalKeyWallet {
    async fn connect(&self) -> Result<Address> {
        let mut session = self.session.write().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.address);
        }

        let chain_id = self.chain_id(&self.default_network)?;
        let address = self.key.address();
        *session = Some(WalletSession {
            address,
            chain_id,
            network: self.default_network.clone(),
            signer: self.key.clone().with_chain_id(chain_id),
        });
        info!(
            "Wallet {} connected on {} (chain {})",
            format_address(&address),
            self.default_network,
            chain_id
        );
        Ok(address)
    }

    async fn session(&self) -> Option<WalletSession> {
        self.session.read().await.clone()
    }

    async fn switch_network(&self, network: &str) -> Result<()> {
        let chain_id = self.chain_id(network)?;
        let mut session = self.session.write().await;
        match session.as_mut() {
            Some(current) => {
                current.chain_id = chain_id;
                current.network = network.to_string();
                current.signer = self.key.clone().with_chain_id(chain_id);
                info!("Wallet switched to {} (chain {})", network, chain_id);
                Ok(())
            }
            None => {
                warn!("Network switch to {} requested without a connected wallet", network);
                Err(LendingError::WalletNotConnected)
            }
        }
    }

    async fn disconnect(&self) {
        *self.session.write().await = None;
    }
}
