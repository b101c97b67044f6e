//! Read-only comparison of on-chain loans with their off-chain mirror

use crate::error::{LendingError, Result};
use crate::gateway::ContractGateway;
use crate::storage::LendingStore;
use crate::types::{format_address, Address, LoanId};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub borrower: String,
    pub network: String,
    /// Loans present in both places
    pub matched: usize,
    /// On-chain loans without a mirrored record
    pub missing_offchain: Vec<LoanId>,
    /// Mirrored records that do not correspond to an on-chain loan
    pub missing_onchain: Vec<Uuid>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_offchain.is_empty() && self.missing_onchain.is_empty()
    }
}

/// Compare the loans of `borrower` on `network` with the persisted records
pub async fn reconcile_borrower(
    gateway: &dyn ContractGateway,
    store: &dyn LendingStore,
    borrower: Address,
    network: Option<&str>,
) -> Result<ReconciliationReport> {
    let borrower_hex = format_address(&borrower);
    let (onchain, records) = futures::try_join!(
        gateway.get_user_loans(borrower, network),
        async {
            store
                .list_loans_by_borrower(&borrower_hex)
                .await
                .map_err(LendingError::from)
        }
    )?;

    let onchain_ids: HashSet<String> = onchain.iter().map(|id| id.to_string()).collect();
    let mirrored_ids: HashSet<String> = records
        .iter()
        .filter_map(|r| r.onchain_id.clone())
        .collect();

    let missing_offchain: Vec<LoanId> = onchain
        .iter()
        .filter(|id| !mirrored_ids.contains(&id.to_string()))
        .copied()
        .collect();
    let missing_onchain: Vec<Uuid> = records
        .iter()
        .filter(|r| match &r.onchain_id {
            Some(id) => !onchain_ids.contains(id),
            None => true,
        })
        .map(|r| r.id)
        .collect();

    let report = ReconciliationReport {
        borrower: borrower_hex,
        network: match network {
            Some(name) => name.to_string(),
            None => gateway.get_current_network().await,
        },
        matched: onchain.len() - missing_offchain.len(),
        missing_offchain,
        missing_onchain,
    };

    if report.is_consistent() {
        info!("Loans of {} are consistent ({} matched)", report.borrower, report.matched);
    } else {
        warn!(
            "Loans of {} diverge: {} missing off-chain, {} missing on-chain",
            report.borrower,
            report.missing_offchain.len(),
            report.missing_onchain.len()
        );
    }
    Ok(report)
}
