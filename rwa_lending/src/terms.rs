//! Loan terms calculator
//!
//! The contracts quote total debt, buffer and effective rate through a view
//! call; locally we only normalise inputs (month count to seconds, decimal
//! amount to base units) and compute the amortised monthly payment that is
//! mirrored into the off-chain loan record.

use crate::error::{LendingError, Result};
use crate::types::{SECONDS_PER_MONTH, U256};
use serde::{Deserialize, Serialize};

/// Terms quoted by the loan contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Principal plus interest over the whole duration
    pub total_debt: U256,
    /// Collateral buffer held on top of the debt
    pub buffer_amount: U256,
    /// Effective interest rate as reported by the contract
    pub interest_rate: U256,
}

/// Convert a duration in months to seconds using the fixed 30-day month
pub fn months_to_seconds(months: u32) -> Result<u64> {
    if months == 0 {
        return Err(LendingError::InvalidInput(
            "Duration must be at least one month".to_string(),
        ));
    }
    Ok(u64::from(months) * SECONDS_PER_MONTH)
}

/// Parse a positive decimal amount string into token base units
pub fn parse_amount(amount: &str, decimals: u32) -> Result<U256> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(LendingError::InvalidInput("Amount is required".to_string()));
    }
    if trimmed.starts_with('-') {
        return Err(LendingError::InvalidInput(format!(
            "Amount must be positive: {}",
            trimmed
        )));
    }

    let units: U256 = ethers::utils::parse_units(trimmed, decimals)
        .map_err(|e| LendingError::InvalidInput(format!("Invalid amount {}: {}", trimmed, e)))?
        .into();

    if units.is_zero() {
        return Err(LendingError::InvalidInput(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(units)
}

/// Parse a positive decimal amount string as a float for off-chain records
pub fn parse_principal(amount: &str) -> Result<f64> {
    let value: f64 = amount
        .trim()
        .parse()
        .map_err(|_| LendingError::InvalidInput(format!("Invalid amount: {}", amount)))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(LendingError::InvalidInput(
            "Amount must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Amortised monthly payment (standard annuity formula)
///
/// `annual_rate_percent` is a yearly percentage, e.g. `12.0` for 12%.
pub fn monthly_payment(principal: f64, annual_rate_percent: f64, months: u32) -> f64 {
    if months == 0 {
        return 0.0;
    }
    let n = f64::from(months);
    let r = annual_rate_percent / 12.0 / 100.0;
    if r == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Balance left after one installment of `payment` on `balance`
///
/// Interest for the month accrues first, the payment covers it and the rest
/// goes to principal. Never negative.
pub fn remaining_balance(balance: f64, payment: f64, annual_rate_percent: f64) -> f64 {
    let interest = balance * annual_rate_percent / 12.0 / 100.0;
    (balance + interest - payment).max(0.0)
}
