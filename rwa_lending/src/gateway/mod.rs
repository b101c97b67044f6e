//! Contract gateway
//!
//! Translates application-level loan operations into calls against the
//! deployed loan contracts. Write operations are signed with the session of
//! the wallet provider; view calls only need a network.

use crate::bridges::CrossChainSource;
use crate::error::Result;
use crate::terms::LoanTerms;
use crate::types::{Address, LoanId, TxHash, U256};
use crate::wallet::WalletSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod evm;
pub mod memory;

pub use evm::EvmContractGateway;
pub use memory::InMemoryGateway;

/// Arguments of the loan creation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoanParams {
    /// Collateral asset token
    pub token_id: U256,
    /// Borrower account token
    pub account_token_id: U256,
    /// Duration in seconds
    pub duration: u64,
    /// Principal in payment token base units
    pub amount: U256,
    /// Payment token contract
    pub token_address: Address,
    /// Cross-chain routing, `same_chain()` for local loans
    pub source: CrossChainSource,
}

/// Outcome of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// Loan id emitted by the contract, when it could be derived
    pub loan_id: Option<LoanId>,
}

#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Quote total debt, buffer and rate for a principal and duration (seconds)
    async fn calculate_loan_terms(&self, amount: U256, duration: u64, network: Option<&str>) -> Result<LoanTerms>;

    async fn create_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt>;

    /// Same call shape as `create_loan`, routed through the cross-chain entry point
    async fn create_cross_chain_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt>;

    async fn make_monthly_payment(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt>;

    async fn repay_loan_full(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt>;

    async fn get_user_loans(&self, user: Address, network: Option<&str>) -> Result<Vec<LoanId>>;

    /// Change the network used when a call does not name one
    async fn switch_network(&self, network: &str) -> Result<()>;

    fn get_supported_networks(&self) -> Vec<String>;

    async fn get_current_network(&self) -> String;

    async fn get_block_explorer_url(&self, tx_hash: &TxHash, network: Option<&str>) -> Result<String>;
}
