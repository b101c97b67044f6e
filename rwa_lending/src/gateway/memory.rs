use super::evm::explorer_tx_url;
use super::{ContractGateway, CreateLoanParams, TxReceipt};
use crate::config::Settings;
use crate::error::{LendingError, Result};
use crate::terms::LoanTerms;
use crate::types::{Address, LoanId, TxHash, U256, SECONDS_PER_MONTH};
use crate::wallet::WalletSession;
use async_trait::async_trait;
use ethers::utils::keccak256;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::RwLock;

const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;
const BPS: u64 = 10_000;

fn invalid_parameters() -> LendingError {
    LendingError::Gateway("Invalid loan parameters".to_string())
}

#[derive(Debug, Clone)]
struct SimulatedLoan {
    borrower: Address,
    remaining: U256,
    installment: U256,
    repaid: bool,
}

#[derive(Default)]
struct Ledger {
    loans: HashMap<LoanId, SimulatedLoan>,
    next_loan_id: u64,
    failure: Option<String>,
}

/// In-process simulation of the loan contracts
///
/// Interest is simple interest at `rate_bps` per year over the loan
/// duration and the buffer is `buffer_bps` of the total debt. Writes can be
/// made to fail with `fail_writes` and slowed down with `with_latency`.
#[derive(Clone)]
pub struct InMemoryGateway {
    settings: Settings,
    rate_bps: u64,
    buffer_bps: u64,
    latency: Option<Duration>,
    ledger: Arc<Mutex<Ledger>>,
    current_network: Arc<RwLock<String>>,
    nonce: Arc<AtomicU64>,
    submissions: Arc<AtomicU64>,
}

impl InMemoryGateway {
    pub fn new(settings: Settings) -> Self {
        let current = settings.default_network.clone();
        Self {
            settings,
            rate_bps: 1_200,
            buffer_bps: 1_000,
            latency: None,
            ledger: Arc::new(Mutex::new(Ledger {
                next_loan_id: 1,
                ..Default::default()
            })),
            current_network: Arc::new(RwLock::new(current)),
            nonce: Arc::new(AtomicU64::new(0)),
            submissions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_rates(mut self, rate_bps: u64, buffer_bps: u64) -> Self {
        self.rate_bps = rate_bps;
        self.buffer_bps = buffer_bps;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every write fail with `message` until cleared with `None`
    pub fn fail_writes(&self, message: Option<&str>) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.failure = message.map(str::to_string);
        }
    }

    /// Number of write transactions that reached the contract
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| LendingError::Gateway("simulated ledger poisoned".to_string()))
    }

    fn quote(&self, amount: U256, duration: u64) -> Result<LoanTerms> {
        if amount.is_zero() || duration == 0 {
            return Err(invalid_parameters());
        }
        let interest = amount
            .checked_mul(U256::from(self.rate_bps))
            .and_then(|v| v.checked_mul(U256::from(duration)))
            .and_then(|v| v.checked_div(U256::from(BPS * SECONDS_PER_YEAR)))
            .ok_or_else(invalid_parameters)?;
        let total_debt = amount.checked_add(interest).ok_or_else(invalid_parameters)?;
        let buffer_amount = total_debt
            .checked_mul(U256::from(self.buffer_bps))
            .and_then(|v| v.checked_div(U256::from(BPS)))
            .ok_or_else(invalid_parameters)?;
        Ok(LoanTerms {
            total_debt,
            buffer_amount,
            interest_rate: U256::from(self.rate_bps),
        })
    }

    fn next_tx_hash(&self) -> TxHash {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        TxHash::from(keccak256(n.to_be_bytes()))
    }

    async fn begin_write(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.ledger()?.failure.clone() {
            return Err(LendingError::Gateway(message));
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_network(&self, network: Option<&str>) -> Result<()> {
        match network {
            Some(name) if !self.settings.networks.contains_key(name) => {
                Err(LendingError::UnsupportedNetwork(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn open_loan(&self, session: &WalletSession, params: &CreateLoanParams) -> Result<TxReceipt> {
        let months = (params.duration / SECONDS_PER_MONTH).max(1);
        let terms = self.quote(params.amount, params.duration)?;

        let mut ledger = self.ledger()?;
        let loan_id = U256::from(ledger.next_loan_id);
        ledger.next_loan_id += 1;
        ledger.loans.insert(
            loan_id,
            SimulatedLoan {
                borrower: session.address,
                remaining: terms.total_debt,
                installment: terms.total_debt / U256::from(months),
                repaid: false,
            },
        );
        debug!("Simulated loan {} opened for {:?}", loan_id, session.address);

        Ok(TxReceipt {
            tx_hash: self.next_tx_hash(),
            loan_id: Some(loan_id),
        })
    }

    fn borrower_loan<'a>(ledger: &'a mut Ledger, session: &WalletSession, loan_id: LoanId) -> Result<&'a mut SimulatedLoan> {
        let loan = ledger
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| LendingError::Gateway(format!("Loan {} not found", loan_id)))?;
        if loan.borrower != session.address {
            return Err(LendingError::Gateway("Caller is not the borrower".to_string()));
        }
        if loan.repaid {
            return Err(LendingError::Gateway(format!("Loan {} already repaid", loan_id)));
        }
        Ok(loan)
    }
}

#[async_trait]
impl ContractGateway for InMemoryGateway {
    async fn calculate_loan_terms(&self, amount: U256, duration: u64, network: Option<&str>) -> Result<LoanTerms> {
        self.ensure_network(network)?;
        self.quote(amount, duration)
    }

    async fn create_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        self.ensure_network(network)?;
        self.begin_write().await?;
        self.open_loan(session, params)
    }

    async fn create_cross_chain_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        self.ensure_network(network)?;
        if !params.source.is_cross_chain() {
            return Err(LendingError::InvalidInput(
                "Cross-chain loan requires a source chain selector".to_string(),
            ));
        }
        self.begin_write().await?;
        self.open_loan(session, params)
    }

    async fn make_monthly_payment(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        self.ensure_network(network)?;
        self.begin_write().await?;
        {
            let mut ledger = self.ledger()?;
            let loan = Self::borrower_loan(&mut ledger, session, loan_id)?;
            loan.remaining = loan.remaining.saturating_sub(loan.installment);
            if loan.remaining.is_zero() {
                loan.repaid = true;
            }
        }
        Ok(TxReceipt {
            tx_hash: self.next_tx_hash(),
            loan_id: Some(loan_id),
        })
    }

    async fn repay_loan_full(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        self.ensure_network(network)?;
        self.begin_write().await?;
        {
            let mut ledger = self.ledger()?;
            let loan = Self::borrower_loan(&mut ledger, session, loan_id)?;
            loan.remaining = U256::zero();
            loan.repaid = true;
        }
        Ok(TxReceipt {
            tx_hash: self.next_tx_hash(),
            loan_id: Some(loan_id),
        })
    }

    async fn get_user_loans(&self, user: Address, network: Option<&str>) -> Result<Vec<LoanId>> {
        self.ensure_network(network)?;
        let ledger = self.ledger()?;
        let mut ids: Vec<LoanId> = ledger
            .loans
            .iter()
            .filter(|(_, loan)| loan.borrower == user)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn switch_network(&self, network: &str) -> Result<()> {
        self.ensure_network(Some(network))?;
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
        let name = match network {
            Some(name) => name.to_string(),
            None => self.get_current_network().await,
        };
        let config = self
            .settings
            .networks
            .get(&name)
            .ok_or_else(|| LendingError::UnsupportedNetwork(name.clone()))?;
        Ok(explorer_tx_url(&config.explorer_url, tx_hash))
    }
}
