//! Loan workflow integration tests
//! Drive the workflow against the in-memory contract simulation and store

use async_trait::async_trait;
use rwa_lending::bridges::CrossChainSource;
use rwa_lending::config::Settings;
use rwa_lending::gateway::{ContractGateway, CreateLoanParams, InMemoryGateway, TxReceipt};
use rwa_lending::reconcile::reconcile_borrower;
use rwa_lending::services::{AssetRegistry, LoanLedger, TokenizationRequest};
use rwa_lending::storage::{
    self, AssetRecord, CollateralStatus, LendingStore, LoanRecord, LoanStatus, MemoryStore,
    StorageError, VerificationStatus,
};
use rwa_lending::terms::LoanTerms;
use rwa_lending::types::{Address, LoanId, TxHash, U256, ZERO_ADDRESS};
use rwa_lending::wallet::{LocalKeyWallet, WalletProvider, WalletSession};
use rwa_lending::workflow::{LoanOrigination, LoanRequest, LoanWorkflow, OriginationRequest};
use rwa_lending::{LendingError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Gateway wrapper remembering which entry point received which arguments
struct RecordingGateway {
    inner: InMemoryGateway,
    calls: Mutex<Vec<(&'static str, CreateLoanParams)>>,
}

impl RecordingGateway {
    fn new() -> Self {
        Self {
            inner: InMemoryGateway::new(Settings::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(&'static str, CreateLoanParams)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContractGateway for RecordingGateway {
    async fn calculate_loan_terms(&self, amount: U256, duration: u64, network: Option<&str>) -> Result<LoanTerms> {
        self.inner.calculate_loan_terms(amount, duration, network).await
    }

    async fn create_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        self.calls.lock().unwrap().push(("create_loan", params.clone()));
        self.inner.create_loan(session, params, network).await
    }

    async fn create_cross_chain_loan(&self, session: &WalletSession, params: &CreateLoanParams, network: Option<&str>) -> Result<TxReceipt> {
        self.calls.lock().unwrap().push(("create_cross_chain_loan", params.clone()));
        self.inner.create_cross_chain_loan(session, params, network).await
    }

    async fn make_monthly_payment(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        self.inner.make_monthly_payment(session, loan_id, network).await
    }

    async fn repay_loan_full(&self, session: &WalletSession, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        self.inner.repay_loan_full(session, loan_id, network).await
    }

    async fn get_user_loans(&self, user: Address, network: Option<&str>) -> Result<Vec<LoanId>> {
        self.inner.get_user_loans(user, network).await
    }

    async fn switch_network(&self, network: &str) -> Result<()> {
        self.inner.switch_network(network).await
    }

    fn get_supported_networks(&self) -> Vec<String> {
        self.inner.get_supported_networks()
    }

    async fn get_current_network(&self) -> String {
        self.inner.get_current_network().await
    }

    async fn get_block_explorer_url(&self, tx_hash: &TxHash, network: Option<&str>) -> Result<String> {
        self.inner.get_block_explorer_url(tx_hash, network).await
    }
}

/// Memory store whose loan inserts or collateral updates can be made to fail
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_loan_insert: AtomicBool,
    fail_collateral_update: AtomicBool,
}

#[async_trait]
impl LendingStore for FlakyStore {
    async fn insert_loan(&self, loan: &LoanRecord) -> storage::Result<()> {
        if self.fail_loan_insert.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError("loans table unavailable".to_string()));
        }
        self.inner.insert_loan(loan).await
    }

    async fn get_loan(&self, id: Uuid) -> storage::Result<Option<LoanRecord>> {
        self.inner.get_loan(id).await
    }

    async fn update_loan(&self, loan: &LoanRecord) -> storage::Result<()> {
        self.inner.update_loan(loan).await
    }

    async fn list_loans_by_borrower(&self, borrower: &str) -> storage::Result<Vec<LoanRecord>> {
        self.inner.list_loans_by_borrower(borrower).await
    }

    async fn list_loans_by_asset(&self, asset_id: Uuid) -> storage::Result<Vec<LoanRecord>> {
        self.inner.list_loans_by_asset(asset_id).await
    }

    async fn insert_asset(&self, asset: &AssetRecord) -> storage::Result<()> {
        self.inner.insert_asset(asset).await
    }

    async fn get_asset(&self, id: Uuid) -> storage::Result<Option<AssetRecord>> {
        self.inner.get_asset(id).await
    }

    async fn update_asset_collateral_status(&self, id: Uuid, status: CollateralStatus) -> storage::Result<()> {
        if self.fail_collateral_update.load(Ordering::SeqCst) {
            return Err(StorageError::WriteError("assets table unavailable".to_string()));
        }
        self.inner.update_asset_collateral_status(id, status).await
    }

    async fn update_asset_verification(&self, id: Uuid, status: VerificationStatus) -> storage::Result<()> {
        self.inner.update_asset_verification(id, status).await
    }

    async fn list_assets_by_owner(&self, owner: &str) -> storage::Result<Vec<AssetRecord>> {
        self.inner.list_assets_by_owner(owner).await
    }
}

fn wallet() -> Arc<LocalKeyWallet> {
    Arc::new(LocalKeyWallet::from_private_key(DEV_KEY, &Settings::default()).unwrap())
}

fn loan_request(cross_chain: bool, source_chain: Option<&str>) -> LoanRequest {
    LoanRequest {
        token_id: U256::from(11u64),
        account_token_id: U256::from(12u64),
        duration: 12 * 30 * 24 * 60 * 60,
        amount: "10000".to_string(),
        token_address: Address::from_low_u64_be(0x5ca1e),
        cross_chain,
        source_chain: source_chain.map(str::to_string),
        network: None,
    }
}

async fn verified_asset(store: &Arc<dyn LendingStore>, owner: Address) -> Uuid {
    let registry = AssetRegistry::new(store.clone());
    let asset = registry
        .request_tokenization(TokenizationRequest {
            owner,
            name: "Grain silo".to_string(),
            value: 40_000.0,
            location: Some("Kansas".to_string()),
            blockchain: Some("sepolia".to_string()),
            token_id: Some("11".to_string()),
        })
        .await
        .unwrap();
    registry.approve(asset.id).await.unwrap();
    asset.id
}

fn origination_request(asset_id: Uuid) -> OriginationRequest {
    OriginationRequest {
        asset_id,
        token_id: U256::from(11u64),
        account_token_id: U256::from(12u64),
        amount: "10000".to_string(),
        duration_months: 12,
        interest_rate: 12.0,
        token_address: Address::from_low_u64_be(0x5ca1e),
        cross_chain: false,
        source_chain: None,
        network: None,
    }
}

#[tokio::test]
async fn test_same_chain_loan_ignores_source_chain() {
    let gateway = Arc::new(RecordingGateway::new());
    let wallet = wallet();
    let workflow = LoanWorkflow::new(wallet.clone(), gateway.clone(), 18);
    workflow.connect().await.unwrap();

    workflow
        .create_loan(&loan_request(false, Some("polygon")))
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    let (entry, params) = &calls[0];
    assert_eq!(*entry, "create_loan");
    assert_eq!(params.source.selector, 0);
    assert_eq!(params.source.source_address, ZERO_ADDRESS);
    assert_eq!(params.amount, U256::from(10_000u64) * U256::exp10(18));
}

#[tokio::test]
async fn test_cross_chain_loan_resolves_selector_and_caller() {
    let gateway = Arc::new(RecordingGateway::new());
    let wallet = wallet();
    let workflow = LoanWorkflow::new(wallet.clone(), gateway.clone(), 18);
    let caller = workflow.connect().await.unwrap();

    let receipt = workflow
        .create_loan(&loan_request(true, Some("arbitrum")))
        .await
        .unwrap();
    assert!(receipt.loan_id.is_some());

    let calls = gateway.calls();
    let (entry, params) = &calls[0];
    assert_eq!(*entry, "create_cross_chain_loan");
    assert_eq!(
        params.source,
        CrossChainSource {
            selector: 4949039107694359620,
            source_address: caller,
        }
    );
    assert_eq!(
        workflow.state().await.last_tx_hash,
        Some(receipt.tx_hash)
    );
}

#[tokio::test]
async fn test_cross_chain_loan_with_unknown_chain_is_rejected() {
    let gateway = Arc::new(RecordingGateway::new());
    let workflow = LoanWorkflow::new(wallet(), gateway.clone(), 18);
    workflow.connect().await.unwrap();

    let err = workflow
        .create_loan(&loan_request(true, Some("solana")))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::UnsupportedChain(_)));
    assert!(gateway.calls().is_empty());
    assert_eq!(
        workflow.state().await.error.as_deref(),
        Some("Unsupported source chain: solana")
    );
}

#[tokio::test]
async fn test_wallet_not_connected_short_circuits() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let workflow = LoanWorkflow::new(wallet(), gateway.clone(), 18);

    let err = workflow.create_loan(&loan_request(false, None)).await.unwrap_err();
    assert!(matches!(err, LendingError::WalletNotConnected));
    assert!(workflow.make_monthly_payment(U256::one(), None).await.is_err());
    assert!(workflow.repay_loan_full(U256::one(), None).await.is_err());
    assert_eq!(gateway.submissions(), 0);

    let state = workflow.state().await;
    assert!(!state.is_loading);
    assert_eq!(state.error.as_deref(), Some("Wallet not connected"));
}

#[tokio::test]
async fn test_gateway_failure_is_surfaced_as_string() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let workflow = LoanWorkflow::new(wallet(), gateway.clone(), 18);
    workflow.connect().await.unwrap();

    gateway.fail_writes(Some(""));
    assert!(workflow.repay_loan_full(U256::from(9u64), None).await.is_err());
    assert_eq!(workflow.state().await.error.as_deref(), Some("Failed to repay loan"));

    gateway.fail_writes(Some("insufficient allowance"));
    assert!(workflow.make_monthly_payment(U256::from(9u64), None).await.is_err());
    assert_eq!(
        workflow.state().await.error.as_deref(),
        Some("insufficient allowance")
    );

    // a new operation clears the previous error
    gateway.fail_writes(None);
    workflow.get_user_loans(None).await.unwrap();
    assert_eq!(workflow.state().await.error, None);
}

#[tokio::test]
async fn test_calculate_terms() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()).with_rates(1_200, 500));
    let workflow = LoanWorkflow::new(wallet(), gateway, 6);

    // view calls do not need a wallet
    let terms = workflow.calculate_terms("1000", 12, None).await.unwrap();
    assert!(terms.total_debt > U256::from(1_000_000_000u64));
    assert_eq!(terms.interest_rate, U256::from(1_200u64));

    assert!(workflow.calculate_terms("0", 12, None).await.is_err());
    assert!(workflow.calculate_terms("1000", 0, None).await.is_err());
    assert!(workflow.calculate_terms("1000", 12, Some("solana")).await.is_err());
}

#[tokio::test]
async fn test_loading_flag_does_not_block_repeated_submission() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()).with_latency(Duration::from_millis(50)));
    let workflow = Arc::new(LoanWorkflow::new(wallet(), gateway.clone(), 18));
    workflow.connect().await.unwrap();

    let request = loan_request(false, None);
    let first = {
        let workflow = workflow.clone();
        let request = request.clone();
        tokio::spawn(async move { workflow.create_loan(&request).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(workflow.is_loading().await);

    // a second click while loading goes straight through
    let second = workflow.create_loan(&request).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_ne!(first.loan_id, second.loan_id);
    assert_eq!(gateway.submissions(), 2);
}

#[tokio::test]
async fn test_switch_network_is_not_verified() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let wallet = wallet();
    let workflow = LoanWorkflow::new(wallet.clone(), gateway.clone(), 18);
    workflow.connect().await.unwrap();

    workflow.switch_network("amoy").await.unwrap();
    assert_eq!(gateway.get_current_network().await, "amoy");
    assert_eq!(wallet.session().await.unwrap().chain_id, 80_002);

    let hash = TxHash::from_low_u64_be(1);
    assert!(workflow
        .explorer_url(&hash, None)
        .await
        .unwrap()
        .starts_with("https://amoy.polygonscan.com/tx/"));
}

#[tokio::test]
async fn test_failed_submission_persists_nothing() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn LendingStore> = store.clone();
    let wallet = wallet();
    let workflow = Arc::new(LoanWorkflow::new(wallet.clone(), gateway.clone(), 18));
    let owner = workflow.connect().await.unwrap();
    let asset_id = verified_asset(&dyn_store, owner).await;
    let origination = LoanOrigination::new(workflow, LoanLedger::new(dyn_store.clone()));

    gateway.fail_writes(Some("execution reverted"));
    assert!(origination.originate(origination_request(asset_id)).await.is_err());

    assert_eq!(store.loan_count(), 0);
    let asset = dyn_store.require_asset(asset_id).await.unwrap();
    assert_eq!(asset.collateral_status, CollateralStatus::Available);
}

#[tokio::test]
async fn test_persistence_failure_after_submission_is_reported() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let flaky = Arc::new(FlakyStore::default());
    let store: Arc<dyn LendingStore> = flaky.clone();
    let workflow = Arc::new(LoanWorkflow::new(wallet(), gateway.clone(), 18));
    let owner = workflow.connect().await.unwrap();
    let asset_id = verified_asset(&store, owner).await;
    let origination = LoanOrigination::new(workflow, LoanLedger::new(store.clone()));

    flaky.fail_loan_insert.store(true, Ordering::SeqCst);
    let outcome = origination
        .originate(origination_request(asset_id))
        .await
        .unwrap();
    assert!(!outcome.persisted());
    assert!(outcome.record.is_none());
    assert!(!outcome.collateral_locked);
    assert!(outcome.persistence_error.is_some());
    assert_eq!(gateway.submissions(), 1);
    assert_eq!(flaky.inner.loan_count(), 0);
}

#[tokio::test]
async fn test_unlocked_collateral_is_reported_with_stored_record() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let flaky = Arc::new(FlakyStore::default());
    let store: Arc<dyn LendingStore> = flaky.clone();
    let workflow = Arc::new(LoanWorkflow::new(wallet(), gateway.clone(), 18));
    let owner = workflow.connect().await.unwrap();
    let asset_id = verified_asset(&store, owner).await;
    let origination = LoanOrigination::new(workflow, LoanLedger::new(store.clone()));

    flaky.fail_collateral_update.store(true, Ordering::SeqCst);
    let outcome = origination
        .originate(origination_request(asset_id))
        .await
        .unwrap();

    // the row exists even though the asset was not pledged
    let record = outcome.record.clone().unwrap();
    assert!(!outcome.persisted());
    assert!(!outcome.collateral_locked);
    assert!(outcome.persistence_error.is_some());
    assert_eq!(store.require_loan(record.id).await.unwrap().status, LoanStatus::Pending);
    assert_eq!(
        store.require_asset(asset_id).await.unwrap().collateral_status,
        CollateralStatus::Available
    );
}

#[tokio::test]
async fn test_ineligible_asset_is_not_submitted() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let store: Arc<dyn LendingStore> = Arc::new(MemoryStore::new());
    let workflow = Arc::new(LoanWorkflow::new(wallet(), gateway.clone(), 18));
    let owner = workflow.connect().await.unwrap();
    let origination = LoanOrigination::new(workflow, LoanLedger::new(store.clone()));

    // unknown asset
    assert!(origination
        .originate(origination_request(Uuid::new_v4()))
        .await
        .is_err());

    // pending verification
    let pending = AssetRegistry::new(store.clone())
        .request_tokenization(TokenizationRequest {
            owner,
            name: "Warehouse".to_string(),
            value: 20_000.0,
            location: None,
            blockchain: None,
            token_id: None,
        })
        .await
        .unwrap();
    assert!(matches!(
        origination.originate(origination_request(pending.id)).await,
        Err(LendingError::InvalidInput(_))
    ));

    // already pledged
    let asset_id = verified_asset(&store, owner).await;
    origination.originate(origination_request(asset_id)).await.unwrap();
    assert!(origination.originate(origination_request(asset_id)).await.is_err());

    assert_eq!(gateway.submissions(), 1);
}

#[tokio::test]
async fn test_last_installment_releases_collateral() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let store: Arc<dyn LendingStore> = Arc::new(MemoryStore::new());
    let workflow = Arc::new(LoanWorkflow::new(wallet(), gateway.clone(), 18));
    let borrower = workflow.connect().await.unwrap();
    let asset_id = verified_asset(&store, borrower).await;
    let origination = LoanOrigination::new(workflow, LoanLedger::new(store.clone()));

    let mut request = origination_request(asset_id);
    request.amount = "100".to_string();
    request.duration_months = 1;
    let outcome = origination.originate(request).await.unwrap();
    let record = outcome.record.unwrap();
    let loan_id = outcome.receipt.loan_id.unwrap();

    origination.pay_installment(loan_id, None).await.unwrap();

    let closed = store.require_loan(record.id).await.unwrap();
    assert_eq!(closed.status, LoanStatus::Repaid);
    assert_eq!(closed.outstanding_balance, 0.0);
    assert_eq!(
        store.require_asset(asset_id).await.unwrap().collateral_status,
        CollateralStatus::Available
    );
    // the contract considers it repaid as well
    assert!(origination.repay_in_full(loan_id, None).await.is_err());
}

#[tokio::test]
async fn test_full_loan_lifecycle() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let store: Arc<dyn LendingStore> = Arc::new(MemoryStore::new());
    let workflow = Arc::new(LoanWorkflow::new(wallet(), gateway.clone(), 18));
    let borrower = workflow.connect().await.unwrap();
    let asset_id = verified_asset(&store, borrower).await;
    let origination = LoanOrigination::new(workflow.clone(), LoanLedger::new(store.clone()));

    let outcome = origination.originate(origination_request(asset_id)).await.unwrap();
    let record = outcome.record.clone().unwrap();
    let loan_id = outcome.receipt.loan_id.unwrap();
    assert_eq!(record.status, LoanStatus::Pending);
    assert!((record.monthly_payment - 888.49).abs() < 0.01);
    assert_eq!(
        store.require_asset(asset_id).await.unwrap().collateral_status,
        CollateralStatus::Collateralized
    );

    let report = reconcile_borrower(gateway.as_ref(), store.as_ref(), borrower, None)
        .await
        .unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.matched, 1);

    origination.pay_installment(loan_id, None).await.unwrap();
    assert_eq!(
        store.require_loan(record.id).await.unwrap().status,
        LoanStatus::Active
    );

    origination.repay_in_full(loan_id, None).await.unwrap();
    let closed = store.require_loan(record.id).await.unwrap();
    assert_eq!(closed.status, LoanStatus::Repaid);
    assert_eq!(
        store.require_asset(asset_id).await.unwrap().collateral_status,
        CollateralStatus::Available
    );
}

#[tokio::test]
async fn test_reconcile_reports_unmirrored_loans() {
    let gateway = Arc::new(InMemoryGateway::new(Settings::default()));
    let store: Arc<dyn LendingStore> = Arc::new(MemoryStore::new());
    let workflow = LoanWorkflow::new(wallet(), gateway.clone(), 18);
    let borrower = workflow.connect().await.unwrap();

    // submitted on-chain without the mirror write
    let receipt = workflow.create_loan(&loan_request(false, None)).await.unwrap();

    let report = reconcile_borrower(gateway.as_ref(), store.as_ref(), borrower, Some("sepolia"))
        .await
        .unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.missing_offchain, vec![receipt.loan_id.unwrap()]);
    assert!(report.missing_onchain.is_empty());
    assert_eq!(report.network, "sepolia");
}
