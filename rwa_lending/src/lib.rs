//! Loan and asset workflow for real-world-asset backed lending
//!
//! Layers, leaf first: a wallet provider holding the signer, a contract
//! gateway translating loan operations into transactions, a persistence
//! layer mirroring loans and assets off-chain, and the workflow that
//! sequences them.

pub mod bridges;
pub mod config;
pub mod error;
pub mod gateway;
pub mod reconcile;
pub mod services;
pub mod storage;
pub mod terms;
pub mod types;
pub mod wallet;
pub mod workflow;

pub use error::{LendingError, Result};
