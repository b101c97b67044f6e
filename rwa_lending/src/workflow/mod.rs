//! Loan workflow
//!
//! Validates user input, derives call arguments and sequences wallet and
//! gateway calls. Every operation records its progress in a `WorkflowState`
//! that a front end can render: a loading flag, the last error message and
//! the last transaction hash.
//!
//! The loading flag is advisory. Nothing here rejects a call while another
//! is in flight; callers that must not double-submit have to serialize
//! themselves.

use crate::bridges::{selector, CrossChainSource};
use crate::error::{LendingError, Result};
use crate::gateway::{ContractGateway, CreateLoanParams, TxReceipt};
use crate::terms::{months_to_seconds, parse_amount, LoanTerms};
use crate::types::{Address, LoanId, TxHash, U256};
use crate::wallet::{WalletProvider, WalletSession};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod origination;

pub use origination::{LoanOrigination, OriginationOutcome, OriginationRequest};

/// Render state of the workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowState {
    pub is_loading: bool,
    /// Message of the last failed operation, cleared when a new one starts
    pub error: Option<String>,
    pub last_tx_hash: Option<TxHash>,
}

/// Loan creation input as collected from the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRequest {
    /// Collateral asset token
    pub token_id: U256,
    /// Borrower account token
    pub account_token_id: U256,
    /// Duration in seconds
    pub duration: u64,
    /// Principal, decimal string in payment token units
    pub amount: String,
    /// Payment token contract
    pub token_address: Address,
    pub cross_chain: bool,
    /// Source chain name, only read when `cross_chain` is set
    pub source_chain: Option<String>,
    pub network: Option<String>,
}

/// Cross-chain routing for a request made by `caller`
///
/// Unlike `selector::resolve`, which falls back to selector 0, an unknown
/// source chain is rejected with `UnsupportedChain` here. A cross-chain loan
/// sent with selector 0 would be indistinguishable from a same-chain one.
pub fn loan_source(request: &LoanRequest, caller: Address) -> Result<CrossChainSource> {
    if !request.cross_chain {
        return Ok(CrossChainSource::same_chain());
    }
    let chain = request.source_chain.as_deref().unwrap_or_default();
    let selector = selector::try_resolve(chain)
        .ok_or_else(|| LendingError::UnsupportedChain(chain.to_string()))?;
    Ok(CrossChainSource {
        selector,
        source_address: caller,
    })
}

pub struct LoanWorkflow {
    wallet: Arc<dyn WalletProvider>,
    gateway: Arc<dyn ContractGateway>,
    /// Decimals of the payment token
    decimals: u32,
    state: RwLock<WorkflowState>,
}

impl LoanWorkflow {
    pub fn new(wallet: Arc<dyn WalletProvider>, gateway: Arc<dyn ContractGateway>, decimals: u32) -> Self {
        Self {
            wallet,
            gateway,
            decimals,
            state: RwLock::new(WorkflowState::default()),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn ContractGateway> {
        &self.gateway
    }

    pub async fn state(&self) -> WorkflowState {
        self.state.read().await.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    /// Run `operation`, mirroring its progress and outcome into the state
    async fn track<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let result = fut.await;

        let mut state = self.state.write().await;
        state.is_loading = false;
        if let Err(e) = &result {
            let message = e.user_message(operation);
            warn!("Failed to {}: {}", operation, message);
            state.error = Some(message);
        }
        result
    }

    async fn record_tx(&self, receipt: &TxReceipt) {
        self.state.write().await.last_tx_hash = Some(receipt.tx_hash);
    }

    async fn require_session(&self) -> Result<WalletSession> {
        self.wallet
            .session()
            .await
            .ok_or(LendingError::WalletNotConnected)
    }

    pub async fn connect(&self) -> Result<Address> {
        self.track("connect wallet", self.wallet.connect()).await
    }

    /// Ask the wallet and the gateway to move to `network`
    ///
    /// The wallet switch is not confirmed before the gateway follows.
    pub async fn switch_network(&self, network: &str) -> Result<()> {
        self.track("switch network", async {
            self.wallet.switch_network(network).await?;
            self.gateway.switch_network(network).await?;
            info!("Switched to {}", network);
            Ok(())
        })
        .await
    }

    /// Quote terms for `amount` over `months` months
    pub async fn calculate_terms(&self, amount: &str, months: u32, network: Option<&str>) -> Result<LoanTerms> {
        self.track("calculate loan terms", async {
            let units = parse_amount(amount, self.decimals)?;
            let duration = months_to_seconds(months)?;
            self.gateway.calculate_loan_terms(units, duration, network).await
        })
        .await
    }

    /// Build the contract arguments for a loan request
    ///
    /// Same-chain requests always carry selector 0 and the zero address,
    /// whatever `source_chain` says. Cross-chain requests resolve the selector
    /// from the source chain name and use the caller as source address.
    pub fn loan_params(&self, request: &LoanRequest, session: &WalletSession) -> Result<CreateLoanParams> {
        if request.duration == 0 {
            return Err(LendingError::InvalidInput("Duration must be positive".to_string()));
        }
        let amount = parse_amount(&request.amount, self.decimals)?;
        let source = loan_source(request, session.address)?;

        Ok(CreateLoanParams {
            token_id: request.token_id,
            account_token_id: request.account_token_id,
            duration: request.duration,
            amount,
            token_address: request.token_address,
            source,
        })
    }

    pub async fn create_loan(&self, request: &LoanRequest) -> Result<TxReceipt> {
        let receipt = self
            .track("create loan", async {
                let session = self.require_session().await?;
                let params = self.loan_params(request, &session)?;
                let network = request.network.as_deref();
                debug!("Creating loan with {:?}", params);
                if params.source.is_cross_chain() {
                    self.gateway.create_cross_chain_loan(&session, &params, network).await
                } else {
                    self.gateway.create_loan(&session, &params, network).await
                }
            })
            .await?;
        self.record_tx(&receipt).await;
        Ok(receipt)
    }

    pub async fn make_monthly_payment(&self, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        let receipt = self
            .track("make monthly payment", async {
                let session = self.require_session().await?;
                self.gateway.make_monthly_payment(&session, loan_id, network).await
            })
            .await?;
        self.record_tx(&receipt).await;
        Ok(receipt)
    }

    pub async fn repay_loan_full(&self, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        let receipt = self
            .track("repay loan", async {
                let session = self.require_session().await?;
                self.gateway.repay_loan_full(&session, loan_id, network).await
            })
            .await?;
        self.record_tx(&receipt).await;
        Ok(receipt)
    }

    /// Loan ids of the connected account
    pub async fn get_user_loans(&self, network: Option<&str>) -> Result<Vec<LoanId>> {
        self.track("fetch loans", async {
            let session = self.require_session().await?;
            self.gateway.get_user_loans(session.address, network).await
        })
        .await
    }

    pub async fn explorer_url(&self, tx_hash: &TxHash, network: Option<&str>) -> Result<String> {
        self.gateway.get_block_explorer_url(tx_hash, network).await
    }

    /// Connected account, if any
    pub async fn account(&self) -> Option<Address> {
        self.wallet.address().await
    }
}
