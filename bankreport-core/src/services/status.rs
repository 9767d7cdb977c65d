//! Status service - store summary for `brp status`

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::adapters::duckdb::{DuckDbRepository, StoreCounts};
use crate::domain::Banker;

pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let counts = self.repository.counts()?;
        let bankers = self.repository.list_bankers()?;

        Ok(StatusSummary {
            counts,
            bankers: bankers.into_iter().map(BankerSummary::from).collect(),
        })
    }

    /// Remove job statuses whose TTL has passed
    pub fn purge_expired_jobs(&self) -> Result<usize> {
        let removed = self.repository.purge_expired_cache()?;
        if removed > 0 {
            tracing::debug!(removed, "expired job statuses purged");
        }
        Ok(removed)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    #[serde(flatten)]
    pub counts: StoreCounts,
    pub bankers: Vec<BankerSummary>,
}

#[derive(Debug, Serialize)]
pub struct BankerSummary {
    pub id: i64,
    pub code: String,
    pub name: String,
}

impl From<Banker> for BankerSummary {
    fn from(banker: Banker) -> Self {
        Self {
            id: banker.id,
            code: banker.code,
            name: banker.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of_seeded_store() {
        let repo = Arc::new(DuckDbRepository::in_memory().unwrap());
        repo.ensure_schema().unwrap();
        repo.add_banker("RO1", "Rina", None).unwrap();
        repo.add_banker("RO2", "Budi", None).unwrap();

        let status = StatusService::new(repo).get_status().unwrap();
        assert_eq!(status.counts.bankers, 2);
        assert_eq!(status.counts.balance_records, 0);
        assert!(status.counts.latest_report_date.is_none());
        assert_eq!(status.bankers.len(), 2);
        assert_eq!(status.bankers[0].code, "RO1");
    }
}
