//! Wallet provider abstraction
//!
//! A wallet exposes the connected account, a transaction signer and network
//! switching. Switching is fire-and-forget: callers do not wait for the new
//! chain to be confirmed before issuing further calls.

use crate::error::Result;
use crate::types::{Address, NetworkName};
use async_trait::async_trait;
use ethers::signers::LocalWallet;

pub mod local;

pub use local::LocalKeyWallet;

/// Ephemeral connection state owned by the wallet provider
#[derive(Debug, Clone)]
pub struct WalletSession {
    /// Connected account
    pub address: Address,
    /// Chain the signer is bound to
    pub chain_id: u64,
    /// Configured network name for `chain_id`
    pub network: NetworkName,
    /// Transaction signer
    pub signer: LocalWallet,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt for a connection and return the connected account
    async fn connect(&self) -> Result<Address>;

    /// Current session, `None` while disconnected
    async fn session(&self) -> Option<WalletSession>;

    /// Request a chain change
    async fn switch_network(&self, network: &str) -> Result<()>;

    async fn disconnect(&self);

    async fn address(&self) -> Option<Address> {
        self.session().await.map(|s| s.address)
    }
}
