//! Account domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency used when neither the spreadsheet nor the caller names one
pub const DEFAULT_CURRENCY: &str = "IDR";

/// A client account held at the bank
///
/// Accounts are owned by the record-management side of the system; the
/// reconciliation pipeline only reads them and updates their balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Normalized account number (alphanumeric only)
    pub account_number: String,
    pub client_id: i64,
    /// Relationship officer currently managing the account
    pub banker_id: Option<i64>,
    pub product_id: Option<i64>,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub current_balance: Decimal,
    pub available_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new, not yet persisted account (id 0) with zero balances
    pub fn new(account_number: &str, client_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            account_number: Self::normalize_number(account_number),
            client_id,
            banker_id: None,
            product_id: None,
            currency: DEFAULT_CURRENCY.to_string(),
            current_balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Strip every character that is not an ASCII letter or digit.
    ///
    /// Idempotent: normalizing an already-normalized number returns it unchanged.
    pub fn normalize_number(raw: &str) -> String {
        raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.account_number.is_empty() {
            return Err("account number cannot be empty");
        }
        if self.currency.trim().is_empty() {
            return Err("currency cannot be empty");
        }
        Ok(())
    }
}

/// A sellable account product (savings, current account, deposit, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProduct {
    pub id: i64,
    pub code: String,
    pub name: String,
}
