//! Cross-chain message routing selectors
//!
//! Cross-chain loans are routed by a numeric chain selector plus the address
//! that originated the request on the source chain.

use crate::types::{Address, ZERO_ADDRESS};
use log::warn;
use serde::{Deserialize, Serialize};

/// Known source chains and their routing selectors
pub const CHAIN_SELECTORS: [(&str, u64); 3] = [
    ("ethereum", 5_009_297_550_715_157_269),
    ("polygon", 4_051_577_828_743_386_545),
    ("arbitrum", 4_949_039_107_694_359_620),
];

/// Look up the selector of a source chain, `None` when unknown
pub fn try_resolve(chain: &str) -> Option<u64> {
    let chain = chain.trim().to_ascii_lowercase();
    CHAIN_SELECTORS
        .iter()
        .find(|(name, _)| *name == chain)
        .map(|(_, selector)| *selector)
}

/// Look up the selector of a source chain
///
/// Unknown chains resolve to 0, the same value used for same-chain loans.
pub fn resolve(chain: &str) -> u64 {
    match try_resolve(chain) {
        Some(selector) => selector,
        None => {
            warn!("Unknown source chain '{}', resolving selector to 0", chain);
            0
        }
    }
}

/// Names of all chains with a known selector
pub fn supported_chains() -> Vec<&'static str> {
    CHAIN_SELECTORS.iter().map(|(name, _)| *name).collect()
}

/// Source descriptor attached to a loan creation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainSource {
    /// Routing selector of the source chain (0 = same chain)
    pub selector: u64,
    /// Originating address on the source chain
    pub source_address: Address,
}

impl CrossChainSource {
    /// Descriptor for a loan that originates on the settlement chain
    pub fn same_chain() -> Self {
        Self {
            selector: 0,
            source_address: ZERO_ADDRESS,
        }
    }

    pub fn is_cross_chain(&self) -> bool {
        self.selector != 0
    }
}

impl Default for CrossChainSource {
    fn default() -> Self {
        Self::same_chain()
    }
}
