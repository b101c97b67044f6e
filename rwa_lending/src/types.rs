//! Shared primitive types for the lending workflow

pub use ethers::types::{Address, TxHash, H160, U256};

/// On-chain loan identifier
pub type LoanId = U256;

/// Name of a configured network (e.g. "sepolia", "polygon")
pub type NetworkName = String;

/// Sentinel source address for loans that are not cross-chain
pub const ZERO_ADDRESS: Address = H160([0u8; 20]);

/// Fixed 30-day month used by the loan contracts
pub const SECONDS_PER_MONTH: u64 = 30 * 24 * 60 * 60;

/// Format an address the way wallets and explorers print it
pub fn format_address(address: &Address) -> String {
    format!("{:#x}", address)
}

/// Format a transaction hash as 0x-prefixed lowercase hex
pub fn format_tx_hash(hash: &TxHash) -> String {
    format!("{:#x}", hash)
}
