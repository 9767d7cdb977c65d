//! Import preview models

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::row::RowError;

/// One accepted row of an import, ready for operator approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub row_number: usize,
    pub banker_code: String,
    pub cif: String,
    pub client_name: String,
    pub account_number: String,
    pub product_code: String,
    pub currency: String,
    /// Balance currently on record, zero for accounts that do not exist yet
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub available_balance: Decimal,
    pub client_id: i64,
    pub banker_id: i64,
    pub account_id: Option<i64>,
    pub is_new_account: bool,
}

impl PreviewEntry {
    pub fn balance_change(&self) -> Decimal {
        self.new_balance - self.previous_balance
    }
}

/// Counters accumulated over one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Data rows read from the file (header excluded)
    pub total_rows: usize,
    /// Rows filtered out, failed validation, or failed resolution
    pub rows_skipped: usize,
    /// Valid rows that matched an existing account
    pub accounts_to_update: usize,
    /// Valid rows, each of which implies a new balance-history record
    pub new_transactions_detected: usize,
}

impl ImportSummary {
    /// Fold another chunk's counters into this one
    pub fn absorb(&mut self, other: &ImportSummary) {
        self.total_rows += other.total_rows;
        self.rows_skipped += other.rows_skipped;
        self.accounts_to_update += other.accounts_to_update;
        self.new_transactions_detected += other.new_transactions_detected;
    }
}

/// The computed, not yet committed result of one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub report_date: NaiveDate,
    pub valid_rows: Vec<PreviewEntry>,
    pub summary: ImportSummary,
    pub errors: Vec<RowError>,
    pub universal_bankers_to_update_ids: BTreeSet<i64>,
}

impl PreviewResult {
    /// Rows the operator would create a new account for
    pub fn new_account_count(&self) -> usize {
        self.valid_rows.iter().filter(|e| e.is_new_account).count()
    }

    /// Entries whose source row number is in `rows`, in preview order
    pub fn select_rows(&self, rows: &[usize]) -> Vec<PreviewEntry> {
        self.valid_rows
            .iter()
            .filter(|e| rows.contains(&e.row_number))
            .cloned()
            .collect()
    }

    /// Requested row numbers that are not valid rows of this preview,
    /// ascending and without repeats
    pub fn missing_rows(&self, rows: &[usize]) -> Vec<usize> {
        let mut missing: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|r| !self.valid_rows.iter().any(|e| e.row_number == *r))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}
