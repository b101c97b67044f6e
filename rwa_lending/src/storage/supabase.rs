//! Supabase persistence over the PostgREST HTTP interface
//!
//! Tables: `loans` and `assets`, columns named after the record fields.

use super::{
    AssetRecord, CollateralStatus, LendingStore, LoanRecord, Result, StorageError,
    VerificationStatus,
};
use crate::config::SupabaseConfig;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

const LOANS_TABLE: &str = "loans";
const ASSETS_TABLE: &str = "assets";

pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &SupabaseConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StorageError::ConnectionError(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("Supabase request '{}' failed with {}: {}", what, status, body);
        Err(match status {
            StatusCode::CONFLICT => StorageError::Conflict(format!("{}: {}", what, body)),
            StatusCode::NOT_FOUND => StorageError::NotFound(format!("{}: {}", what, body)),
            s if s.is_client_error() => StorageError::InvalidData(format!("{}: {}", what, body)),
            _ => StorageError::WriteError(format!("{}: {} {}", what, status, body)),
        })
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<()> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(request, &format!("insert into {}", table)).await?;
        Ok(())
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, filter: &[(&str, String)]) -> Result<Vec<T>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend(filter.iter().cloned());
        let request = self.client.get(self.table_url(table)).query(&query);
        let response = self.send(request, &format!("select from {}", table)).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StorageError::ReadError(format!("{}: {}", table, e)))
    }

    /// PATCH matching rows and return how many were updated
    async fn patch<T: Serialize + Sync>(&self, table: &str, id: Uuid, body: &T) -> Result<usize> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .json(body);
        let response = self.send(request, &format!("update {}", table)).await?;
        let rows = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| StorageError::ReadError(format!("{}: {}", table, e)))?;
        debug!("Updated {} row(s) in {}", rows.len(), table);
        Ok(rows.len())
    }

    async fn patch_one<T: Serialize + Sync>(&self, table: &str, id: Uuid, body: &T) -> Result<()> {
        match self.patch(table, id, body).await? {
            0 => Err(StorageError::NotFound(format!("{} {}", table, id))),
            _ => Ok(()),
        }
    }
}

fn eq(id: Uuid) -> String {
    format!("eq.{}", id)
}

fn ilike(value: &str) -> String {
    format!("ilike.{}", value)
}

#[async_trait]
impl LendingStore for SupabaseStore {
    async fn insert_loan(&self, loan: &LoanRecord) -> Result<()> {
        self.insert(LOANS_TABLE, loan).await
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<LoanRecord>> {
        let rows: Vec<LoanRecord> = self.select(LOANS_TABLE, &[("id", eq(id))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_loan(&self, loan: &LoanRecord) -> Result<()> {
        self.patch_one(LOANS_TABLE, loan.id, loan).await
    }

    async fn list_loans_by_borrower(&self, borrower: &str) -> Result<Vec<LoanRecord>> {
        self.select(
            LOANS_TABLE,
            &[
                ("borrower", ilike(borrower)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn list_loans_by_asset(&self, asset_id: Uuid) -> Result<Vec<LoanRecord>> {
        self.select(LOANS_TABLE, &[("asset_id", eq(asset_id))]).await
    }

    async fn insert_asset(&self, asset: &AssetRecord) -> Result<()> {
        self.insert(ASSETS_TABLE, asset).await
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<AssetRecord>> {
        let rows: Vec<AssetRecord> = self.select(ASSETS_TABLE, &[("id", eq(id))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_asset_collateral_status(&self, id: Uuid, status: CollateralStatus) -> Result<()> {
        let body = serde_json::json!({
            "collateral_status": status,
            "updated_at": Utc::now(),
        });
        self.patch_one(ASSETS_TABLE, id, &body).await
    }

    async fn update_asset_verification(&self, id: Uuid, status: VerificationStatus) -> Result<()> {
        let body = serde_json::json!({
            "verification_status": status,
            "updated_at": Utc::now(),
        });
        self.patch_one(ASSETS_TABLE, id, &body).await
    }

    async fn list_assets_by_owner(&self, owner: &str) -> Result<Vec<AssetRecord>> {
        self.select(
            ASSETS_TABLE,
            &[
                ("owner", ilike(owner)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }
}
