//! Asset tokenization requests and the admin verification step

use crate::error::{LendingError, Result};
use crate::storage::{AssetRecord, CollateralStatus, LendingStore, VerificationStatus};
use crate::types::{format_address, Address};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Tokenization request submitted by an asset owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizationRequest {
    pub owner: Address,
    pub name: String,
    /// Appraised value
    pub value: f64,
    pub location: Option<String>,
    pub blockchain: Option<String>,
    pub token_id: Option<String>,
}

pub struct AssetRegistry {
    store: Arc<dyn LendingStore>,
}

impl AssetRegistry {
    pub fn new(store: Arc<dyn LendingStore>) -> Self {
        Self { store }
    }

    /// Create a pending, uncollateralized asset record
    pub async fn request_tokenization(&self, request: TokenizationRequest) -> Result<AssetRecord> {
        if request.name.trim().is_empty() {
            return Err(LendingError::InvalidInput("Asset name is required".to_string()));
        }
        if !request.value.is_finite() || request.value <= 0.0 {
            return Err(LendingError::InvalidInput(
                "Asset value must be greater than zero".to_string(),
            ));
        }

        let now = Utc::now();
        let asset = AssetRecord {
            id: Uuid::new_v4(),
            owner: format_address(&request.owner),
            name: request.name.trim().to_string(),
            original_value: request.value,
            current_value: request.value,
            verification_status: VerificationStatus::Pending,
            collateral_status: CollateralStatus::Available,
            location: request.location,
            blockchain: request.blockchain,
            token_id: request.token_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_asset(&asset).await?;
        info!("Tokenization requested for asset {} by {}", asset.id, asset.owner);
        Ok(asset)
    }

    pub async fn approve(&self, asset_id: Uuid) -> Result<AssetRecord> {
        self.review(asset_id, VerificationStatus::Verified).await
    }

    pub async fn reject(&self, asset_id: Uuid) -> Result<AssetRecord> {
        self.review(asset_id, VerificationStatus::Rejected).await
    }

    async fn review(&self, asset_id: Uuid, outcome: VerificationStatus) -> Result<AssetRecord> {
        let mut asset = self.store.require_asset(asset_id).await?;
        if asset.verification_status != VerificationStatus::Pending {
            return Err(LendingError::InvalidInput(format!(
                "Asset {} has already been reviewed ({:?})",
                asset_id, asset.verification_status
            )));
        }
        self.store.update_asset_verification(asset_id, outcome).await?;
        asset.verification_status = outcome;
        info!("Asset {} review: {:?}", asset_id, outcome);
        Ok(asset)
    }

    pub async fn get(&self, asset_id: Uuid) -> Result<AssetRecord> {
        Ok(self.store.require_asset(asset_id).await?)
    }

    pub async fn list_for_owner(&self, owner: &Address) -> Result<Vec<AssetRecord>> {
        Ok(self.store.list_assets_by_owner(&format_address(owner)).await?)
    }
}
