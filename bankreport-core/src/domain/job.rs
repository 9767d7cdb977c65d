//! Background job models
//!
//! A `Job` is the unit of work handed to the queue; a `JobStatus` is what
//! the polling client reads back from the cache under the job's key.
//!
//! Wire format of a status:
//! ```json
//! {"status": "processing"}
//! {"status": "completed", "data": { ...preview or commit result... }}
//! {"status": "completed", "file_path": "...", "file_name": "..."}
//! {"status": "failed", "message": "..."}
//! {"status": "not_found"}
//! ```

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::preview::{PreviewEntry, PreviewResult};

/// Cache key prefixes, by convention only; keys are opaque to the core
pub const IMPORT_PREVIEW_PREFIX: &str = "import_preview_";
pub const IMPORT_FINALIZE_PREFIX: &str = "import_finalize_";
pub const EXPORT_REPORT_PREFIX: &str = "export_report_";

/// Parameters of a banker performance export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub banker_ids: Vec<i64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Year whose closing balance is the growth baseline
    pub baseline_year: i32,
}

impl ExportRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.banker_ids.is_empty() {
            return Err("at least one banker is required");
        }
        if self.start_date > self.end_date {
            return Err("start date must not be after end date");
        }
        Ok(())
    }

    /// Last day of the baseline year
    pub fn baseline_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.baseline_year, 12, 31)
    }
}

/// A unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    ImportPreview {
        file_path: PathBuf,
        report_date: NaiveDate,
        cache_key: String,
    },
    FinalizeImport {
        entries: Vec<PreviewEntry>,
        report_date: NaiveDate,
        override_existing: bool,
        cache_key: String,
    },
    ExportReport {
        request: ExportRequest,
        cache_key: String,
    },
}

impl Job {
    /// Key the job publishes its status under
    pub fn cache_key(&self) -> &str {
        match self {
            Job::ImportPreview { cache_key, .. }
            | Job::FinalizeImport { cache_key, .. }
            | Job::ExportReport { cache_key, .. } => cache_key,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::ImportPreview { .. } => JobKind::ImportPreview,
            Job::FinalizeImport { .. } => JobKind::FinalizeImport,
            Job::ExportReport { .. } => JobKind::ExportReport,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ImportPreview,
    FinalizeImport,
    ExportReport,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ImportPreview => "import_preview",
            JobKind::FinalizeImport => "finalize_import",
            JobKind::ExportReport => "export_report",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account the commit left untouched, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSkip {
    pub row_number: usize,
    pub account_number: String,
    pub reason: String,
}

/// Outcome of committing an approved subset of a preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub success: bool,
    pub message: String,
    pub processed_count: usize,
    #[serde(default)]
    pub skipped: Vec<CommitSkip>,
}

/// Payload of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Preview { data: PreviewResult },
    Commit { data: CommitResult },
    Report { file_path: String, file_name: String },
}

/// Status of a background job as seen through the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    NotFound,
    Processing,
    Completed {
        #[serde(flatten)]
        output: JobOutput,
    },
    Failed {
        message: String,
    },
}

impl JobStatus {
    pub fn completed(output: JobOutput) -> Self {
        JobStatus::Completed { output }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        JobStatus::Failed {
            message: message.into(),
        }
    }

    /// Completed and failed are final until the key expires
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::NotFound => "not_found",
            JobStatus::Processing => "processing",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }

    /// The preview carried by a completed import job
    pub fn preview(&self) -> Option<&PreviewResult> {
        match self {
            JobStatus::Completed {
                output: JobOutput::Preview { data },
            } => Some(data),
            _ => None,
        }
    }
}
