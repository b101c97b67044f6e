pub mod selector;

pub use selector::{resolve, try_resolve, CrossChainSource, CHAIN_SELECTORS};
