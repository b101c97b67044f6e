use super::{
    AssetRecord, CollateralStatus, LendingStore, LoanRecord, Result, StorageError,
    VerificationStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    loans: HashMap<Uuid, LoanRecord>,
    assets: HashMap<Uuid, AssetRecord>,
}

/// Simple in-memory store, used when no Supabase endpoint is configured and in tests
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<Tables>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(Tables::default())),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.data
            .lock()
            .map_err(|_| StorageError::ConnectionError("memory store lock poisoned".to_string()))
    }

    pub fn loan_count(&self) -> usize {
        self.tables().map(|t| t.loans.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LendingStore for MemoryStore {
    async fn insert_loan(&self, loan: &LoanRecord) -> Result<()> {
        let mut data = self.tables()?;
        if data.loans.contains_key(&loan.id) {
            return Err(StorageError::Conflict(format!("loan {}", loan.id)));
        }
        data.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<LoanRecord>> {
        let data = self.tables()?;
        Ok(data.loans.get(&id).cloned())
    }

    async fn update_loan(&self, loan: &LoanRecord) -> Result<()> {
        let mut data = self.tables()?;
        match data.loans.get_mut(&loan.id) {
            Some(existing) => {
                *existing = loan.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("loan {}", loan.id))),
        }
    }

    async fn list_loans_by_borrower(&self, borrower: &str) -> Result<Vec<LoanRecord>> {
        let data = self.tables()?;
        let mut loans: Vec<LoanRecord> = data
            .loans
            .values()
            .filter(|l| l.borrower.eq_ignore_ascii_case(borrower))
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.created_at);
        Ok(loans)
    }

    async fn list_loans_by_asset(&self, asset_id: Uuid) -> Result<Vec<LoanRecord>> {
        let data = self.tables()?;
        Ok(data
            .loans
            .values()
            .filter(|l| l.asset_id == asset_id)
            .cloned()
            .collect())
    }

    async fn insert_asset(&self, asset: &AssetRecord) -> Result<()> {
        let mut data = self.tables()?;
        if data.assets.contains_key(&asset.id) {
            return Err(StorageError::Conflict(format!("asset {}", asset.id)));
        }
        data.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<AssetRecord>> {
        let data = self.tables()?;
        Ok(data.assets.get(&id).cloned())
    }

    async fn update_asset_collateral_status(&self, id: Uuid, status: CollateralStatus) -> Result<()> {
        let mut data = self.tables()?;
        let asset = data
            .assets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("asset {}", id)))?;
        asset.collateral_status = status;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn update_asset_verification(&self, id: Uuid, status: VerificationStatus) -> Result<()> {
        let mut data = self.tables()?;
        let asset = data
            .assets
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("asset {}", id)))?;
        asset.verification_status = status;
        asset.updated_at = Utc::now();
        Ok(())
    }

    async fn list_assets_by_owner(&self, owner: &str) -> Result<Vec<AssetRecord>> {
        let data = self.tables()?;
        let mut assets: Vec<AssetRecord> = data
            .assets
            .values()
            .filter(|a| a.owner.eq_ignore_ascii_case(owner))
            .cloned()
            .collect();
        assets.sort_by_key(|a| a.created_at);
        Ok(assets)
    }
}
