//! Repository port - database abstraction

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::Result;
use crate::domain::{Account, AccountTransaction, Banker, BankerDailyBalance, Client};

/// Balance reconciliation for one account on one report date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    /// Source spreadsheet row, carried for reporting
    pub row_number: usize,
    pub account_number: String,
    pub banker_id: i64,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

/// What applying a `BalanceUpdate` did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BalanceUpdateOutcome {
    /// Balances updated and a new history row recorded
    Applied { account_id: i64 },
    /// Balances updated and the existing history row for the date replaced
    Replaced { account_id: i64 },
    /// A history row for the date exists and overriding was not requested
    AlreadyRecorded { account_id: i64 },
    /// No account with this number exists
    AccountNotFound,
}

impl BalanceUpdateOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(
            self,
            BalanceUpdateOutcome::Applied { .. } | BalanceUpdateOutcome::Replaced { .. }
        )
    }
}

/// Database repository abstraction
///
/// Lookups return `Ok(None)` for "not found"; an `Err` always means the
/// store itself is unavailable or broken.
pub trait Repository: Send + Sync {
    // === Lookups ===

    /// Exact-match banker lookup by personnel code
    fn find_banker_by_code(&self, code: &str) -> Result<Option<Banker>>;

    /// Exact-match client lookup by CIF
    fn find_client_by_cif(&self, cif: &str) -> Result<Option<Client>>;

    /// Exact-match account lookup by normalized account number
    fn find_account_by_number(&self, account_number: &str) -> Result<Option<Account>>;

    /// Bankers with the given ids, ordered by id; unknown ids are ignored
    fn get_bankers_by_ids(&self, ids: &[i64]) -> Result<Vec<Banker>>;

    // === Balances ===

    /// Apply a batch of balance updates inside a single store transaction.
    ///
    /// Each account row is re-read inside the transaction. Any error rolls
    /// the whole batch back.
    fn apply_balance_updates(
        &self,
        report_date: NaiveDate,
        updates: &[BalanceUpdate],
        override_existing: bool,
    ) -> Result<Vec<BalanceUpdateOutcome>>;

    /// Balance history for an account, oldest report date first
    fn get_account_transactions(&self, account_id: i64) -> Result<Vec<AccountTransaction>>;

    /// Per-banker balance totals for every report date in `[start, end]`
    fn get_banker_daily_balances(
        &self,
        banker_ids: &[i64],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BankerDailyBalance>>;

    /// Per-banker sum of each account's latest balance on or before `as_of`
    fn get_banker_balances_as_of(
        &self,
        banker_ids: &[i64],
        as_of: NaiveDate,
    ) -> Result<Vec<(i64, Decimal)>>;
}
