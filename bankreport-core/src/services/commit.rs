//! Commit service - persists an operator-approved subset of a preview
//!
//! Entries are committed in chunks, one store transaction per chunk. A chunk
//! that fails is rolled back in full; chunks committed before it stay.
//! Account creation is not done here: entries for unknown accounts are
//! reported as skipped.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use crate::domain::{CommitResult, CommitSkip, PreviewEntry};
use crate::ports::{BalanceUpdate, BalanceUpdateOutcome, Repository};

pub const DEFAULT_COMMIT_CHUNK_SIZE: usize = 500;

pub struct CommitService {
    repository: Arc<dyn Repository>,
    chunk_size: usize,
}

impl CommitService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            chunk_size: DEFAULT_COMMIT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Apply balance updates for the accepted entries
    ///
    /// Safe to call again with the same input: without `override_existing`
    /// already-recorded dates are skipped, with it they are replaced.
    pub fn commit(
        &self,
        entries: &[PreviewEntry],
        report_date: NaiveDate,
        override_existing: bool,
    ) -> Result<CommitResult> {
        let mut processed = 0usize;
        let mut skipped = Vec::new();

        for (index, chunk) in entries.chunks(self.chunk_size).enumerate() {
            let updates: Vec<BalanceUpdate> = chunk
                .iter()
                .map(|e| BalanceUpdate {
                    row_number: e.row_number,
                    account_number: e.account_number.clone(),
                    banker_id: e.banker_id,
                    balance: e.new_balance,
                    available_balance: e.available_balance,
                })
                .collect();

            let outcomes =
                match self
                    .repository
                    .apply_balance_updates(report_date, &updates, override_existing)
                {
                    Ok(outcomes) => outcomes,
                    Err(e) => {
                        tracing::warn!(chunk = index + 1, "commit chunk rolled back: {}", e);
                        return Ok(CommitResult {
                            success: false,
                            message: format!(
                                "Chunk {} of {} failed and was rolled back after {} updates: {}",
                                index + 1,
                                entries.len().div_ceil(self.chunk_size),
                                processed,
                                e
                            ),
                            processed_count: processed,
                            skipped,
                        });
                    }
                };

            for (update, outcome) in updates.iter().zip(outcomes) {
                if let Some(reason) = skip_reason(&outcome, report_date) {
                    skipped.push(CommitSkip {
                        row_number: update.row_number,
                        account_number: update.account_number.clone(),
                        reason,
                    });
                } else {
                    processed += 1;
                }
            }
        }

        Ok(CommitResult {
            success: true,
            message: summary_message(processed, skipped.len(), report_date),
            processed_count: processed,
            skipped,
        })
    }
}

fn skip_reason(outcome: &BalanceUpdateOutcome, report_date: NaiveDate) -> Option<String> {
    match outcome {
        BalanceUpdateOutcome::Applied { .. } | BalanceUpdateOutcome::Replaced { .. } => None,
        BalanceUpdateOutcome::AlreadyRecorded { .. } => Some(format!(
            "balance for {} already recorded; use override to replace it",
            report_date
        )),
        BalanceUpdateOutcome::AccountNotFound => {
            Some("account does not exist; create it before committing".to_string())
        }
    }
}

fn summary_message(processed: usize, skipped: usize, report_date: NaiveDate) -> String {
    let noun = if processed == 1 { "account" } else { "accounts" };
    if skipped == 0 {
        format!("Updated {} {} for {}", processed, noun, report_date)
    } else {
        format!(
            "Updated {} {} for {}, skipped {}",
            processed, noun, report_date, skipped
        )
    }
}
