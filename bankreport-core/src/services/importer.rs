//! Row processing - drives one spreadsheet through validation and resolution
//!
//! A `RowImporter` owns the accumulator for exactly one run. Rows are fed in
//! chunks to bound memory; the chunk size never changes the result because
//! all state lives in the accumulator, not in the chunk.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::adapters::spreadsheet;
use crate::domain::{ImportSummary, PreviewEntry, PreviewResult, RowError, SheetRow};
use crate::ports::Repository;
use crate::services::resolver::EntityResolver;
use crate::services::validator::RowValidator;

/// Chunk size used when the configuration does not name one
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

pub struct RowImporter {
    validator: RowValidator,
    resolver: EntityResolver,
    report_date: NaiveDate,
    chunk_size: usize,
    summary: ImportSummary,
    valid_rows: Vec<PreviewEntry>,
    errors: Vec<RowError>,
    affected_bankers: BTreeSet<i64>,
}

impl RowImporter {
    pub fn new(repository: Arc<dyn Repository>, report_date: NaiveDate) -> Self {
        Self {
            validator: RowValidator::default(),
            resolver: EntityResolver::new(repository),
            report_date,
            chunk_size: DEFAULT_CHUNK_SIZE,
            summary: ImportSummary::default(),
            valid_rows: Vec::new(),
            errors: Vec::new(),
            affected_bankers: BTreeSet::new(),
        }
    }

    pub fn with_validator(mut self, validator: RowValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Zero is treated as one
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Read a spreadsheet file and process all of its rows
    ///
    /// Fails only when the file cannot be read or the store is unavailable;
    /// problems with individual rows end up in the preview's errors.
    pub fn import_file(&mut self, path: &Path) -> Result<()> {
        let rows = spreadsheet::open_sheet(path)
            .with_context(|| format!("Cannot read spreadsheet {}", path.display()))?;

        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut chunks = 0usize;
        for row in rows {
            chunk.push(row?);
            if chunk.len() == self.chunk_size {
                self.process_chunk(&chunk)?;
                chunk.clear();
                chunks += 1;
            }
        }
        if !chunk.is_empty() {
            self.process_chunk(&chunk)?;
            chunks += 1;
        }

        let stats = self.resolver.stats();
        tracing::debug!(
            chunks,
            total_rows = self.summary.total_rows,
            store_queries = stats.queries,
            memo_hits = stats.memo_hits,
            "spreadsheet processed"
        );
        Ok(())
    }

    /// Process one chunk of rows, in order
    pub fn process_chunk(&mut self, rows: &[SheetRow]) -> Result<()> {
        self.summary.total_rows += rows.len();
        for row in rows {
            self.process_row(row)?;
        }
        Ok(())
    }

    fn process_row(&mut self, row: &SheetRow) -> Result<()> {
        let row_number = row.row_number;
        let cells = row.cells.normalized();

        if self.validator.banker_code(&cells).is_none() {
            self.summary.rows_skipped += 1;
            return Ok(());
        }

        let validated = match self.validator.validate_normalized(row_number, &cells) {
            Ok(v) => v,
            Err(field_errors) => {
                self.errors.extend(
                    field_errors
                        .iter()
                        .map(|e| RowError::from_field_error(row_number, e)),
                );
                self.summary.rows_skipped += 1;
                return Ok(());
            }
        };

        let Some(banker) = self.resolver.find_banker(&validated.banker_code)? else {
            self.skip_with_error(
                row_number,
                "banker_code",
                format!("banker not found for code: {}", validated.banker_code),
            );
            return Ok(());
        };

        let account = self.resolver.find_account(&validated.account_number)?;

        let Some(client) = self.resolver.find_client(&validated.cif)? else {
            self.skip_with_error(
                row_number,
                "cif",
                format!("client not found for CIF: {}", validated.cif),
            );
            return Ok(());
        };

        if account.is_some() {
            self.summary.accounts_to_update += 1;
        }
        self.summary.new_transactions_detected += 1;
        self.affected_bankers.insert(banker.id);

        self.valid_rows.push(PreviewEntry {
            row_number,
            banker_code: banker.code,
            cif: client.cif,
            client_name: validated.client_name,
            account_number: validated.account_number,
            product_code: validated.product_code,
            currency: validated.currency,
            previous_balance: account
                .as_ref()
                .map_or(Decimal::ZERO, |a| a.current_balance),
            new_balance: validated.balance,
            available_balance: validated.available_balance,
            client_id: client.id,
            banker_id: banker.id,
            account_id: account.as_ref().map(|a| a.id),
            is_new_account: account.is_none(),
        });
        Ok(())
    }

    fn skip_with_error(&mut self, row_number: usize, field: &str, message: String) {
        self.errors.push(RowError::new(row_number, field, message));
        self.summary.rows_skipped += 1;
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Snapshot of the preview so far
    pub fn preview(&self) -> PreviewResult {
        PreviewResult {
            report_date: self.report_date,
            valid_rows: self.valid_rows.clone(),
            summary: self.summary.clone(),
            errors: self.errors.clone(),
            universal_bankers_to_update_ids: self.affected_bankers.clone(),
        }
    }

    /// Consume the importer and hand back the final preview
    pub fn finish(self) -> PreviewResult {
        PreviewResult {
            report_date: self.report_date,
            valid_rows: self.valid_rows,
            summary: self.summary,
            errors: self.errors,
            universal_bankers_to_update_ids: self.affected_bankers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRow;
    use crate::services::resolver::tests::{fake_repository, FakeRepository};

    fn report_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
    }

    fn row(banker: &str, cif: &str, account: &str, balance: &str) -> RawRow {
        RawRow::from_pairs([
            ("PN Relationship Officer", banker),
            ("CIF", cif),
            ("Client Name", "PT Maju"),
            ("Account Number", account),
            ("Product Code", "SAV"),
            ("Balance", balance),
            ("AvailBalance", balance),
        ])
    }

    fn importer() -> RowImporter {
        RowImporter::new(Arc::new(fake_repository()), report_date())
    }

    #[test]
    fn test_dash_banker_row_is_skipped_silently() {
        let mut importer = importer();
        let rows = SheetRow::numbered([RawRow::from_pairs([
            ("pn_relationship_officer", "-"),
            ("account_number", "12345"),
        ])]);
        importer.process_chunk(&rows).unwrap();

        let preview = importer.finish();
        assert_eq!(preview.summary.total_rows, 1);
        assert_eq!(preview.summary.rows_skipped, 1);
        assert!(preview.errors.is_empty());
        assert!(preview.valid_rows.is_empty());
    }

    #[test]
    fn test_existing_and_new_accounts() {
        let mut importer = importer();
        let rows = SheetRow::numbered([
            row("RO1", "C001", "ACC-1", "750"),
            row("RO1", "C001", "NEW-9", "20"),
        ]);
        importer.process_chunk(&rows).unwrap();

        let preview = importer.finish();
        assert_eq!(preview.valid_rows.len(), 2);
        assert_eq!(preview.summary.accounts_to_update, 1);
        assert_eq!(preview.summary.new_transactions_detected, 2);

        let existing = &preview.valid_rows[0];
        assert_eq!(existing.row_number, 2);
        assert_eq!(existing.account_id, Some(100));
        assert_eq!(existing.previous_balance, Decimal::new(500, 0));
        assert_eq!(existing.balance_change(), Decimal::new(250, 0));

        let new = &preview.valid_rows[1];
        assert!(new.is_new_account);
        assert_eq!(new.previous_balance, Decimal::ZERO);
        assert_eq!(new.client_id, 10);
        assert_eq!(preview.universal_bankers_to_update_ids, BTreeSet::from([1]));
    }

    #[test]
    fn test_resolution_failures_become_row_errors() {
        let mut importer = importer();
        let rows = SheetRow::numbered([
            row("RO7", "C001", "ACC-1", "1"),
            row("RO1", "C404", "ACC-1", "1"),
            row("RO1", "C001", "ACC-1", "oops"),
        ]);
        importer.process_chunk(&rows).unwrap();

        let preview = importer.finish();
        let messages: Vec<(usize, &str)> = preview
            .errors
            .iter()
            .map(|e| (e.row_number, e.message.as_str()))
            .collect();
        assert_eq!(
            messages,
            vec![
                (2, "banker not found for code: RO7"),
                (3, "client not found for CIF: C404"),
                (4, "balance is not a valid number"),
                (4, "available_balance is not a valid number"),
            ]
        );
        assert_eq!(preview.summary.rows_skipped, 3);
        assert!(preview.universal_bankers_to_update_ids.is_empty());
    }

    #[test]
    fn test_summary_conservation_across_chunks() {
        let mut importer = importer().with_chunk_size(2);
        let rows = SheetRow::numbered([
            row("RO1", "C001", "ACC-1", "1"),
            row("-", "C001", "ACC-1", "1"),
            row("RO1", "C404", "ACC-2", "1"),
            row("RO1", "C001", "ACC-3", "x"),
            row("RO1", "C001", "ACC-4", "5"),
        ]);
        for chunk in rows.chunks(2) {
            importer.process_chunk(chunk).unwrap();
        }

        let preview = importer.preview();
        assert_eq!(preview.summary.total_rows, 5);
        assert_eq!(
            preview.summary.total_rows,
            preview.summary.rows_skipped + preview.valid_rows.len()
        );
        let rows: Vec<usize> = preview.valid_rows.iter().map(|e| e.row_number).collect();
        assert_eq!(rows, vec![2, 6]);
    }

    #[test]
    fn test_store_failure_aborts_the_run() {
        let repo = FakeRepository {
            broken: true,
            ..fake_repository()
        };
        let mut importer = RowImporter::new(Arc::new(repo), report_date());
        let rows = SheetRow::numbered([row("RO1", "C001", "ACC-1", "1")]);
        assert!(importer.process_chunk(&rows).is_err());
    }
}
