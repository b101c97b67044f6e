//! Off-chain loan ledger
//!
//! Mirrors loans created on-chain into the persistence layer and keeps the
//! collateral status of the referenced asset in step: an asset is
//! collateralized while at least one non-repaid loan references it.

use crate::bridges::CrossChainSource;
use crate::error::{LendingError, Result};
use crate::storage::{
    AssetRecord, CollateralStatus, LendingStore, LoanRecord, LoanStatus, StorageError,
    VerificationStatus,
};
use crate::terms::{monthly_payment, parse_principal, remaining_balance};
use crate::types::{format_address, format_tx_hash, Address, LoanId, TxHash};
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// Balances below half a cent count as paid off
const SETTLED_BALANCE: f64 = 0.005;

/// Loan to mirror into the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoan {
    pub borrower: Address,
    /// Collateral asset record
    pub asset_id: Uuid,
    /// Principal as entered, decimal string
    pub principal: String,
    pub duration_months: u32,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    pub onchain_id: Option<LoanId>,
    pub tx_hash: Option<TxHash>,
    pub source: CrossChainSource,
}

pub struct LoanLedger {
    store: Arc<dyn LendingStore>,
}

impl LoanLedger {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LendingStore> {
        &self.store
    }

    /// Asset that may secure a new loan: verified and not already pledged
    pub async fn eligible_asset(&self, asset_id: Uuid) -> Result<AssetRecord> {
        let asset = self.store.require_asset(asset_id).await?;
        if asset.verification_status != VerificationStatus::Verified {
            return Err(LendingError::InvalidInput(format!(
                "Asset {} is not verified",
                asset.id
            )));
        }
        if asset.collateral_status == CollateralStatus::Collateralized {
            return Err(StorageError::Conflict(format!("asset {} is already collateralized", asset.id)).into());
        }
        Ok(asset)
    }

    /// Insert a pending loan record without touching its asset
    pub async fn insert_record(&self, new_loan: NewLoan) -> Result<LoanRecord> {
        let principal = parse_principal(&new_loan.principal)?;
        if new_loan.duration_months == 0 {
            return Err(LendingError::InvalidInput(
                "Duration must be at least one month".to_string(),
            ));
        }
        if !new_loan.interest_rate.is_finite() || new_loan.interest_rate < 0.0 {
            return Err(LendingError::InvalidInput(format!(
                "Invalid interest rate: {}",
                new_loan.interest_rate
            )));
        }

        let asset = self.eligible_asset(new_loan.asset_id).await?;

        let now = Utc::now();
        let source = new_loan.source;
        let loan = LoanRecord {
            id: Uuid::new_v4(),
            onchain_id: new_loan.onchain_id.map(|id| id.to_string()),
            borrower: format_address(&new_loan.borrower),
            asset_id: asset.id,
            principal,
            duration_months: new_loan.duration_months,
            interest_rate: new_loan.interest_rate,
            monthly_payment: monthly_payment(principal, new_loan.interest_rate, new_loan.duration_months),
            outstanding_balance: principal,
            status: LoanStatus::Pending,
            source_chain_selector: source.is_cross_chain().then_some(source.selector),
            source_address: source
                .is_cross_chain()
                .then(|| format_address(&source.source_address)),
            tx_hash: new_loan.tx_hash.as_ref().map(format_tx_hash),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_loan(&loan).await.map_err(|e| {
            error!("Failed to insert loan for asset {}: {}", asset.id, e);
            e
        })?;
        Ok(loan)
    }

    /// Pledge the asset referenced by `loan`
    pub async fn collateralize(&self, loan: &LoanRecord) -> Result<()> {
        self.store
            .update_asset_collateral_status(loan.asset_id, CollateralStatus::Collateralized)
            .await
            .map_err(|e| {
                error!("Loan {} recorded but asset {} not collateralized: {}", loan.id, loan.asset_id, e);
                e.into()
            })
    }

    /// Insert a pending loan record and collateralize its asset
    ///
    /// A failed collateral update leaves the inserted row in place.
    pub async fn record_loan(&self, new_loan: NewLoan) -> Result<LoanRecord> {
        let loan = self.insert_record(new_loan).await?;
        self.collateralize(&loan).await?;
        info!(
            "Recorded loan {} ({} over {} months, {:.2}/month) against asset {}",
            loan.id, loan.principal, loan.duration_months, loan.monthly_payment, loan.asset_id
        );
        Ok(loan)
    }

    /// Register a monthly payment
    ///
    /// The first payment activates the loan. Each one amortises the
    /// outstanding balance; the installment that settles it closes the loan
    /// and releases the collateral.
    pub async fn record_payment(&self, loan_id: Uuid) -> Result<LoanRecord> {
        let mut loan = self.store.require_loan(loan_id).await?;
        if loan.status == LoanStatus::Repaid {
            return Err(LendingError::InvalidInput(format!(
                "Loan {} is already repaid",
                loan_id
            )));
        }

        let balance = remaining_balance(loan.outstanding_balance, loan.monthly_payment, loan.interest_rate);
        if balance < SETTLED_BALANCE {
            info!("Final installment received for loan {}", loan.id);
            return self.close_loan(loan.id).await;
        }

        loan.status = LoanStatus::Active;
        loan.outstanding_balance = balance;
        loan.updated_at = Utc::now();
        self.store.update_loan(&loan).await?;
        Ok(loan)
    }

    /// Mark a loan repaid and release its collateral
    pub async fn close_loan(&self, loan_id: Uuid) -> Result<LoanRecord> {
        let mut loan = self.store.require_loan(loan_id).await?;
        if loan.status.is_terminal() {
            return Ok(loan);
        }

        loan.status = LoanStatus::Repaid;
        loan.outstanding_balance = 0.0;
        loan.updated_at = Utc::now();
        self.store.update_loan(&loan).await?;

        let still_pledged = self
            .store
            .list_loans_by_asset(loan.asset_id)
            .await?
            .iter()
            .any(|other| other.id != loan.id && !other.status.is_terminal());
        if !still_pledged {
            self.store
                .update_asset_collateral_status(loan.asset_id, CollateralStatus::Available)
                .await?;
            info!("Asset {} released from loan {}", loan.asset_id, loan.id);
        }
        Ok(loan)
    }

    /// Mirrored record of an on-chain loan
    pub async fn find_by_onchain_id(&self, borrower: &Address, loan_id: LoanId) -> Result<Option<LoanRecord>> {
        Ok(self
            .store
            .find_loan_by_onchain_id(&format_address(borrower), &loan_id.to_string())
            .await?)
    }

    pub async fn loans_for(&self, borrower: &Address) -> Result<Vec<LoanRecord>> {
        Ok(self
            .store
            .list_loans_by_borrower(&format_address(borrower))
            .await?)
    }
}
