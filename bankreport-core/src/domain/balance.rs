//! Balance history domain model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A reported balance for one account on one report date
///
/// `(account_id, report_date)` is unique: re-committing the same report date
/// replaces the row instead of appending a second one.
/// Note: source is a freeform string. Common values are "import" and "manual".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub id: i64,
    pub account_id: i64,
    /// Banker the account was attributed to on this report date
    pub banker_id: Option<i64>,
    pub report_date: NaiveDate,
    /// Balance on record before this report was applied
    pub previous_balance: Decimal,
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountTransaction {
    /// Create a new, not yet persisted balance record
    pub fn new(
        account_id: i64,
        report_date: NaiveDate,
        previous_balance: Decimal,
        balance: Decimal,
        available_balance: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            account_id,
            banker_id: None,
            report_date,
            previous_balance,
            balance,
            available_balance,
            source: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a record from a spreadsheet import
    pub fn from_import(
        account_id: i64,
        report_date: NaiveDate,
        previous_balance: Decimal,
        balance: Decimal,
        available_balance: Decimal,
    ) -> Self {
        let mut record = Self::new(account_id, report_date, previous_balance, balance, available_balance);
        record.source = Some("import".to_string());
        record
    }

    /// Change in balance introduced by this report
    pub fn delta(&self) -> Decimal {
        self.balance - self.previous_balance
    }
}

/// Sum of a banker's account balances on one report date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankerDailyBalance {
    pub banker_id: i64,
    pub report_date: NaiveDate,
    pub total_balance: Decimal,
    pub account_count: i64,
}
