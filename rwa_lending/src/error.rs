//! Error types surfaced by the lending workflow

use crate::storage::StorageError;

/// Errors raised by the wallet, gateway and workflow layers
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Unsupported source chain: {0}")]
    UnsupportedChain(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Persistence error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LendingError {
    /// Message shown to the user for a failed operation.
    ///
    /// Gateway and wallet failures carry their own message; anything without
    /// a usable message falls back to `Failed to <operation>`.
    pub fn user_message(&self, operation: &str) -> String {
        let message = match self {
            LendingError::Gateway(msg) | LendingError::Wallet(msg) => msg.trim().to_string(),
            other => other.to_string(),
        };
        if message.is_empty() {
            format!("Failed to {}", operation)
        } else {
            message
        }
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;
