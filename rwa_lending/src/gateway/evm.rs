//! EVM contract gateway using ethers-rs
//!
//! Talks JSON-RPC to the configured loan manager deployment of each network.
//! Transactions are signed locally with the wallet session key through
//! `SignerMiddleware`; every write waits for one confirmation and checks the
//! receipt status before returning.

use super::{ContractGateway, CreateLoanParams, TxReceipt};
use crate::config::{NetworkConfig, Settings};
use crate::error::{LendingError, Result};
use crate::terms::LoanTerms;
use crate::types::{format_address, format_tx_hash, Address, LoanId, TxHash, U256, ZERO_ADDRESS};
use crate::wallet::WalletSession;
use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, parse_log, ContractCall};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{TransactionReceipt, U64};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::RwLock;

abigen!(
    LoanManager,
    r#"[
        function calculateLoanTerms(uint256 amount, uint256 duration) external view returns (uint256, uint256, uint256)
        function createLoan(uint256 tokenId, uint256 accountTokenId, uint256 duration, uint256 amount, address token, uint64 sourceChainSelector, address sourceAddress) external returns (uint256)
        function makeMonthlyPayment(uint256 loanId) external
        function repayLoanFull(uint256 loanId) external
        function getUserLoans(address user) external view returns (uint256[])
        event LoanCreated(uint256 indexed loanId, address indexed borrower, uint256 amount)
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Gateway to the deployed loan contracts
pub struct EvmContractGateway {
    settings: Settings,
    /// RPC provider per network
    providers: HashMap<String, Provider<Http>>,
    /// Network used when a call does not name one
    current_network: RwLock<String>,
}

impl EvmContractGateway {
    pub fn new(settings: Settings) -> Result<Self> {
        let mut providers = HashMap::new();
        for (name, network) in &settings.networks {
            let provider = Provider::<Http>::try_from(network.rpc_url.as_str()).map_err(|e| {
                LendingError::Config(format!("Invalid RPC URL for {}: {}", name, e))
            })?;
            providers.insert(name.clone(), provider);
        }

        let current_network = RwLock::new(settings.default_network.clone());
        Ok(Self {
            settings,
            providers,
            current_network,
        })
    }

    async fn network_name(&self, network: Option<&str>) -> String {
        match network {
            Some(name) => name.to_string(),
            None => self.current_network.read().await.clone(),
        }
    }

    fn deployment(&self, name: &str) -> Result<(&NetworkConfig, &Provider<Http>)> {
        let config = self
            .settings
            .networks
            .get(name)
            .ok_or_else(|| LendingError::UnsupportedNetwork(name.to_string()))?;
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| LendingError::UnsupportedNetwork(name.to_string()))?;
        if config.loan_manager == ZERO_ADDRESS {
            return Err(LendingError::Config(format!(
                "Loan manager not configured for {}",
                name
            )));
        }
        Ok((config, provider))
    }

    async fn reader(&self, network: Option<&str>) -> Result<LoanManager<Provider<Http>>> {
        let name = self.network_name(network).await;
        let (config, provider) = self.deployment(&name)?;
        Ok(LoanManager::new(config.loan_manager, Arc::new(provider.clone())))
    }

    async fn writer(&self, session: &WalletSession, network: Option<&str>) -> Result<LoanManager<SignerClient>> {
        let name = self.network_name(network).await;
        let (config, provider) = self.deployment(&name)?;
        if session.chain_id != config.chain_id {
            warn!(
                "Wallet session is on chain {} but {} is chain {}; signing for {}",
                session.chain_id, name, config.chain_id, config.chain_id
            );
        }
        let signer = session.signer.clone().with_chain_id(config.chain_id);
        let client = SignerMiddleware::new(provider.clone(), signer);
        Ok(LoanManager::new(config.loan_manager, Arc::new(client)))
    }

    async fn create(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        let contract = self.writer(session, network).await?;
        let call = contract.create_loan(
            params.token_id,
            params.account_token_id,
            U256::from(params.duration),
            params.amount,
            params.token_address,
            params.source.selector,
            params.source.source_address,
        );
        let receipt = submit(call, "create loan").await?;
        let loan_id = loan_id_from_receipt(&receipt);
        if loan_id.is_none() {
            debug!("No LoanCreated event in {}", format_tx_hash(&receipt.transaction_hash));
        }
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            loan_id,
        })
    }
}

/// Send a contract call and wait for a successful receipt
async fn submit<D>(call: ContractCall<SignerClient, D>, what: &str) -> Result<TransactionReceipt>
where
    D: Detokenize + Send + Sync,
{
    let pending = call
        .send()
        .await
        .map_err(|e| LendingError::Gateway(format!("Failed to {}: {}", what, e)))?;

    let tx_hash = format_tx_hash(&pending.tx_hash());
    info!("Submitted {} transaction {}", what, tx_hash);

    let receipt = pending
        .confirmations(1)
        .await
        .map_err(|e| LendingError::Gateway(format!("Failed to confirm {}: {}", what, e)))?
        .ok_or_else(|| LendingError::Gateway(format!("Transaction {} dropped", tx_hash)))?;

    if receipt.status == Some(U64::from(1)) {
        Ok(receipt)
    } else {
        Err(LendingError::Reverted(tx_hash))
    }
}

fn loan_id_from_receipt(receipt: &TransactionReceipt) -> Option<LoanId> {
    receipt
        .logs
        .iter()
        .find_map(|log| parse_log::<LoanCreatedFilter>(log.clone()).ok())
        .map(|event| event.loan_id)
}

#[async_trait]
impl ContractGateway for EvmContractGateway {
    async fn calculate_loan_terms(&self, amount: U256, duration: u64, network: Option<&str>) -> Result<LoanTerms> {
        let contract = self.reader(network).await?;
        let (total_debt, buffer_amount, interest_rate) = contract
            .calculate_loan_terms(amount, U256::from(duration))
            .call()
            .await
            .map_err(|e| LendingError::Gateway(format!("Failed to calculate loan terms: {}", e)))?;
        Ok(LoanTerms {
            total_debt,
            buffer_amount,
            interest_rate,
        })
    }

    async fn create_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        self.create(session, params, network).await
    }

    async fn create_cross_chain_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        if !params.source.is_cross_chain() {
            return Err(LendingError::InvalidInput(
                "Cross-chain loan requires a source chain selector".to_string(),
            ));
        }
        info!(
            "Creating cross-chain loan from selector {} ({})",
            params.source.selector,
            format_address(&params.source.source_address)
        );
        self.create(session, params, network).await
    }

    async fn make_monthly_payment(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        let contract = self.writer(session, network).await?;
        let receipt = submit(contract.make_monthly_payment(loan_id), "make monthly payment").await?;
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            loan_id: Some(loan_id),
        })
    }

    async fn repay_loan_full(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        let contract = self.writer(session, network).await?;
        let receipt = submit(contract.repay_loan_full(loan_id), "repay loan").await?;
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            loan_id: Some(loan_id),
        })
    }

    async fn get_user_loans(&self, user: Address, network: Option<&str>) -> Result<Vec<LoanId>> {
        let contract = self.reader(network).await?;
        contract
            .get_user_loans(user)
            .call()
            .await
            .map_err(|e| LendingError::Gateway(format!("Failed to fetch user loans: {}", e)))
    }

    async fn switch_network(&self, network: &str) -> Result<()> {
        if !self.settings.networks.contains_key(network) {
            return Err(LendingError::UnsupportedNetwork(network.to_string()));
        }
        *self.current_network.write().await = network.to_string();
        Ok(())
    }

    fn get_supported_networks(&self) -> Vec<String> {
        self.settings.network_names()
    }

    async fn get_current_network(&self) -> String {
        self.current_network.read().await.clone()
    }

    async fn get_block_explorer_url(&self, tx_hash: &TxHash, network: Option<&str>) -> Result<String> {
        let name = self.network_name(network).await;
        let config = self
            .settings
            .networks
            .get(&name)
            .ok_or_else(|| LendingError::UnsupportedNetwork(name.clone()))?;
        Ok(explorer_tx_url(&config.explorer_url, tx_hash))
    }
}

pub(crate) fn explorer_tx_url(explorer_url: &str, tx_hash: &TxHash) -> String {
    format!("{}/tx/{}", explorer_url.trim_end_matches('/'), format_tx_hash(tx_hash))
}
