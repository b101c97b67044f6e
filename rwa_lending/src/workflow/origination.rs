//! On-chain submission followed by the off-chain mirror write
//!
//! The two writes are independent. A failed submission leaves the
//! persistence layer untouched; a failed mirror write after a successful
//! submission is logged and reported, never rolled back on-chain.

use super::{loan_source, LoanRequest, LoanWorkflow};
use crate::error::{LendingError, Result};
use crate::gateway::TxReceipt;
use crate::services::{LoanLedger, NewLoan};
use crate::storage::LoanRecord;
use crate::terms::months_to_seconds;
use crate::types::{format_tx_hash, Address, LoanId, U256};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Everything needed to open a loan and mirror it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginationRequest {
    /// Collateral asset record
    pub asset_id: Uuid,
    pub token_id: U256,
    pub account_token_id: U256,
    /// Principal, decimal string
    pub amount: String,
    pub duration_months: u32,
    /// Annual rate in percent used for the mirrored payment schedule
    pub interest_rate: f64,
    pub token_address: Address,
    pub cross_chain: bool,
    pub source_chain: Option<String>,
    pub network: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginationOutcome {
    pub receipt: TxReceipt,
    /// Stored loan row, `None` when it could not be inserted
    pub record: Option<LoanRecord>,
    /// Whether the collateral asset was marked collateralized
    pub collateral_locked: bool,
    /// Message of the failed mirror write
    pub persistence_error: Option<String>,
}

impl OriginationOutcome {
    /// Loan row and collateral status are both written
    pub fn persisted(&self) -> bool {
        self.record.is_some() && self.collateral_locked
    }
}

pub struct LoanOrigination {
    workflow: Arc<LoanWorkflow>,
    ledger: LoanLedger,
}

impl LoanOrigination {
    pub fn new(workflow: Arc<LoanWorkflow>, ledger: LoanLedger) -> Self {
        Self { workflow, ledger }
    }

    pub fn workflow(&self) -> &Arc<LoanWorkflow> {
        &self.workflow
    }

    pub fn ledger(&self) -> &LoanLedger {
        &self.ledger
    }

    async fn borrower(&self) -> Result<Address> {
        self.workflow
            .account()
            .await
            .ok_or(LendingError::WalletNotConnected)
    }

    /// Submit the loan on-chain, then mirror it off-chain
    ///
    /// The collateral asset is checked before anything is submitted, so an
    /// ineligible asset never reaches the contract.
    pub async fn originate(&self, request: OriginationRequest) -> Result<OriginationOutcome> {
        self.ledger.eligible_asset(request.asset_id).await?;

        let loan_request = LoanRequest {
            token_id: request.token_id,
            account_token_id: request.account_token_id,
            duration: months_to_seconds(request.duration_months)?,
            amount: request.amount.clone(),
            token_address: request.token_address,
            cross_chain: request.cross_chain,
            source_chain: request.source_chain.clone(),
            network: request.network.clone(),
        };

        let receipt = self.workflow.create_loan(&loan_request).await?;
        let borrower = self.borrower().await?;
        info!(
            "Loan submitted in {} (loan id {:?})",
            format_tx_hash(&receipt.tx_hash),
            receipt.loan_id
        );

        let source = loan_source(&loan_request, borrower)?;
        let new_loan = NewLoan {
            borrower,
            asset_id: request.asset_id,
            principal: request.amount,
            duration_months: request.duration_months,
            interest_rate: request.interest_rate,
            onchain_id: receipt.loan_id,
            tx_hash: Some(receipt.tx_hash),
            source,
        };

        let record = match self.ledger.insert_record(new_loan).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    "Loan {} is on-chain but was not recorded: {}",
                    format_tx_hash(&receipt.tx_hash),
                    e
                );
                return Ok(OriginationOutcome {
                    receipt,
                    record: None,
                    collateral_locked: false,
                    persistence_error: Some(e.to_string()),
                });
            }
        };

        let persistence_error = match self.ledger.collateralize(&record).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Loan record {} stored without locking its collateral", record.id);
                Some(e.to_string())
            }
        };
        Ok(OriginationOutcome {
            receipt,
            collateral_locked: persistence_error.is_none(),
            record: Some(record),
            persistence_error,
        })
    }

    /// Pay one installment and mirror it; the last one closes the record
    pub async fn pay_installment(&self, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        let receipt = self.workflow.make_monthly_payment(loan_id, network).await?;
        if let Some(record) = self.mirrored(loan_id).await {
            if let Err(e) = self.ledger.record_payment(record.id).await {
                error!("Payment for loan {} not mirrored: {}", loan_id, e);
            }
        }
        Ok(receipt)
    }

    /// Repay in full, then close the mirrored record and release collateral
    pub async fn repay_in_full(&self, loan_id: LoanId, network: Option<&str>) -> Result<TxReceipt> {
        let receipt = self.workflow.repay_loan_full(loan_id, network).await?;
        if let Some(record) = self.mirrored(loan_id).await {
            if let Err(e) = self.ledger.close_loan(record.id).await {
                error!("Repayment of loan {} not mirrored: {}", loan_id, e);
            }
        }
        Ok(receipt)
    }

    async fn mirrored(&self, loan_id: LoanId) -> Option<LoanRecord> {
        let borrower = self.workflow.account().await?;
        match self.ledger.find_by_onchain_id(&borrower, loan_id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                warn!("No mirrored record for loan {}", loan_id);
                None
            }
            Err(e) => {
                error!("Failed to look up mirrored loan {}: {}", loan_id, e);
                None
            }
        }
    }
}
