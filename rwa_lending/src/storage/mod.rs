use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

pub mod memory;
pub mod supabase;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

// Storage-specific Result type
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StorageError {
    NotFound(String),
    WriteError(String),
    ReadError(String),
    ConnectionError(String),
    InvalidData(String),
    Conflict(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::WriteError(msg) => write!(f, "Write error: {}", msg),
            StorageError::ReadError(msg) => write!(f, "Read error: {}", msg),
            StorageError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            StorageError::Conflict(msg) => write!(f, "Conflict: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Lifecycle of a mirrored loan. Loans are never deleted, only transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Active,
    Repaid,
}

impl LoanStatus {
    /// Repaid loans no longer hold their collateral
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Repaid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollateralStatus {
    Available,
    Collateralized,
}

/// Off-chain mirror of an on-chain loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    /// Record id
    pub id: Uuid,
    /// On-chain loan id, when known (decimal string)
    #[serde(default)]
    pub onchain_id: Option<String>,
    /// Borrower address (0x-prefixed)
    pub borrower: String,
    /// Collateral asset record
    pub asset_id: Uuid,
    /// Principal in payment token units
    pub principal: f64,
    /// Duration in months
    pub duration_months: u32,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    /// Amortised monthly payment
    pub monthly_payment: f64,
    /// Outstanding balance
    pub outstanding_balance: f64,
    pub status: LoanStatus,
    /// Source chain selector for cross-chain loans
    #[serde(default)]
    pub source_chain_selector: Option<u64>,
    /// Source address for cross-chain loans
    #[serde(default)]
    pub source_address: Option<String>,
    /// Creation transaction hash
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tokenised real-world asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Record id
    pub id: Uuid,
    /// Owner address (0x-prefixed)
    pub owner: String,
    /// Human readable name
    pub name: String,
    /// Valuation at tokenisation time
    pub original_value: f64,
    /// Latest valuation
    pub current_value: f64,
    pub verification_status: VerificationStatus,
    pub collateral_status: CollateralStatus,
    /// Physical location of the asset
    #[serde(default)]
    pub location: Option<String>,
    /// Network the asset token lives on
    #[serde(default)]
    pub blockchain: Option<String>,
    /// Asset token id, once minted
    #[serde(default)]
    pub token_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Persistence surface for mirrored loans and assets
#[async_trait]
pub trait LendingStore: Send + Sync {
    async fn insert_loan(&self, loan: &LoanRecord) -> Result<()>;
    async fn get_loan(&self, id: Uuid) -> Result<Option<LoanRecord>>;
    async fn update_loan(&self, loan: &LoanRecord) -> Result<()>;
    async fn list_loans_by_borrower(&self, borrower: &str) -> Result<Vec<LoanRecord>>;
    async fn list_loans_by_asset(&self, asset_id: Uuid) -> Result<Vec<LoanRecord>>;

    async fn insert_asset(&self, asset: &AssetRecord) -> Result<()>;
    async fn get_asset(&self, id: Uuid) -> Result<Option<AssetRecord>>;
    async fn update_asset_collateral_status(&self, id: Uuid, status: CollateralStatus) -> Result<()>;
    async fn update_asset_verification(&self, id: Uuid, status: VerificationStatus) -> Result<()>;
    async fn list_assets_by_owner(&self, owner: &str) -> Result<Vec<AssetRecord>>;

    /// Fetch a loan that must exist
    async fn require_loan(&self, id: Uuid) -> Result<LoanRecord> {
        self.get_loan(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("loan {}", id)))
    }

    /// Fetch an asset that must exist
    async fn require_asset(&self, id: Uuid) -> Result<AssetRecord> {
        self.get_asset(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("asset {}", id)))
    }

    /// Find the mirrored record of an on-chain loan id
    async fn find_loan_by_onchain_id(&self, borrower: &str, onchain_id: &str) -> Result<Option<LoanRecord>> {
        Ok(self
            .list_loans_by_borrower(borrower)
            .await?
            .into_iter()
            .find(|loan| loan.onchain_id.as_deref() == Some(onchain_id)))
    }
}
