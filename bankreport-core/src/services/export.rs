//! Banker performance export
//!
//! One CSV row per banker: the baseline balance (each account's last known
//! balance at the end of the baseline year), the banker's total for every
//! report date in range, and growth of the latest total over the baseline.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::ExportRequest;
use crate::ports::{FileStore, Repository, StorageArea};

/// A generated report file
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFile {
    pub file_path: PathBuf,
    pub file_name: String,
}

pub struct ExportService {
    repository: Arc<dyn Repository>,
    files: Arc<dyn FileStore>,
}

impl ExportService {
    pub fn new(repository: Arc<dyn Repository>, files: Arc<dyn FileStore>) -> Self {
        Self { repository, files }
    }

    /// Build the report and store it as `reports/<cache_key>.csv`
    pub fn generate(&self, request: &ExportRequest, cache_key: &str) -> Result<ReportFile> {
        if let Err(reason) = request.validate() {
            bail!("Invalid export request: {}", reason);
        }
        let baseline_date = request
            .baseline_date()
            .with_context(|| format!("Invalid baseline year {}", request.baseline_year))?;

        let bankers = self.repository.get_bankers_by_ids(&request.banker_ids)?;
        if bankers.is_empty() {
            bail!("None of the requested bankers exist");
        }
        let ids: Vec<i64> = bankers.iter().map(|b| b.id).collect();

        let daily = self
            .repository
            .get_banker_daily_balances(&ids, request.start_date, request.end_date)?;
        let baseline: HashMap<i64, Decimal> = self
            .repository
            .get_banker_balances_as_of(&ids, baseline_date)?
            .into_iter()
            .collect();

        let dates: BTreeSet<NaiveDate> = daily.iter().map(|d| d.report_date).collect();
        let mut totals: HashMap<i64, BTreeMap<NaiveDate, Decimal>> = HashMap::new();
        for d in &daily {
            totals
                .entry(d.banker_id)
                .or_default()
                .insert(d.report_date, d.total_balance);
        }

        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![
            "banker_code".to_string(),
            "banker_name".to_string(),
            format!("baseline_{}", request.baseline_year),
        ];
        header.extend(dates.iter().map(|d| d.to_string()));
        header.extend(["latest".to_string(), "growth".to_string(), "growth_pct".to_string()]);
        writer.write_record(&header)?;

        for banker in &bankers {
            let base = baseline.get(&banker.id).copied().unwrap_or(Decimal::ZERO);
            let series = totals.get(&banker.id);

            let mut record = vec![banker.code.clone(), banker.name.clone(), base.to_string()];
            record.extend(dates.iter().map(|date| {
                series
                    .and_then(|s| s.get(date))
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            }));

            let latest = series.and_then(|s| s.values().next_back().copied());
            match latest {
                Some(latest) => {
                    let growth = latest - base;
                    record.push(latest.to_string());
                    record.push(growth.to_string());
                    record.push(growth_pct(growth, base).unwrap_or_default());
                }
                None => record.extend([String::new(), String::new(), String::new()]),
            }
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish report: {}", e))?;

        let file_name = format!("{}.csv", cache_key);
        let file_path = self.files.put(StorageArea::Reports, &file_name, &bytes)?;

        tracing::debug!(
            bankers = bankers.len(),
            dates = dates.len(),
            "report written to {}",
            file_path.display()
        );
        Ok(ReportFile {
            file_path,
            file_name,
        })
    }
}

/// Growth relative to the baseline in percent, two decimals
fn growth_pct(growth: Decimal, base: Decimal) -> Option<String> {
    if base.is_zero() {
        return None;
    }
    Some((growth * Decimal::ONE_HUNDRED / base).round_dp(2).to_string())
}
