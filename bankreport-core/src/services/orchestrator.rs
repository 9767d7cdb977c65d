//! Job orchestration - cache-key lifecycle for background work
//!
//! Every submission follows the same protocol:
//! 1. generate a fresh key (`<prefix><uuid>`)
//! 2. publish `processing` under it
//! 3. hand the job to the queue
//! 4. return the key without waiting
//!
//! Publishing before dispatch means a fast worker's terminal status can
//! never be overwritten by a late `processing`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::adapters::spreadsheet::{self, SUPPORTED_EXTENSIONS};
use crate::domain::job::{EXPORT_REPORT_PREFIX, IMPORT_FINALIZE_PREFIX, IMPORT_PREVIEW_PREFIX};
use crate::domain::{ExportRequest, Job, JobStatus, PreviewEntry};
use crate::ports::{FileStore, JobQueue, StorageArea};
use crate::services::logging::{LogEvent, LoggingService};
use crate::services::status_channel::StatusChannel;

/// Upload ceiling used when the configuration does not name one (20 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

pub struct JobOrchestrator {
    files: Arc<dyn FileStore>,
    queue: Arc<dyn JobQueue>,
    channel: StatusChannel,
    max_upload_bytes: u64,
    logger: Option<Arc<LoggingService>>,
}

impl JobOrchestrator {
    pub fn new(files: Arc<dyn FileStore>, queue: Arc<dyn JobQueue>, channel: StatusChannel) -> Self {
        Self {
            files,
            queue,
            channel,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            logger: None,
        }
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Check an upload's name and size before anything is stored
    pub fn check_upload(&self, file_name: &str, size: u64) -> Result<String> {
        let Some(ext) = spreadsheet::extension_of(Path::new(file_name)) else {
            bail!("File has no extension; expected one of: {}", SUPPORTED_EXTENSIONS.join(", "));
        };
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            bail!(
                "Unsupported file type .{}; expected one of: {}",
                ext,
                SUPPORTED_EXTENSIONS.join(", ")
            );
        }
        if size == 0 {
            bail!("File is empty");
        }
        if size > self.max_upload_bytes {
            bail!(
                "File is {} bytes; the limit is {} bytes",
                size,
                self.max_upload_bytes
            );
        }
        Ok(ext)
    }

    /// Store an uploaded spreadsheet and queue its preview
    pub fn submit_import(
        &self,
        file_name: &str,
        bytes: &[u8],
        report_date: NaiveDate,
    ) -> Result<String> {
        let ext = self.check_upload(file_name, bytes.len() as u64)?;
        let cache_key = new_key(IMPORT_PREVIEW_PREFIX);

        let stored_name = format!("{}.{}", cache_key, ext);
        let file_path = self
            .files
            .put(StorageArea::Imports, &stored_name, bytes)
            .context("Failed to store upload")?;

        tracing::info!(
            cache_key = %cache_key,
            sha256 = %fingerprint(bytes),
            bytes = bytes.len(),
            "upload stored"
        );

        self.start(Job::ImportPreview {
            file_path,
            report_date,
            cache_key: cache_key.clone(),
        })?;
        Ok(cache_key)
    }

    /// Read a spreadsheet from disk and submit it
    pub fn submit_import_path(&self, path: &Path, report_date: NaiveDate) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file path: {}", path.display()))?;
        let size = fs::metadata(path)
            .with_context(|| format!("Cannot read {}", path.display()))?
            .len();
        // Reject before loading an oversized file into memory
        self.check_upload(file_name, size)?;

        let bytes = fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
        self.submit_import(file_name, &bytes, report_date)
    }

    /// Queue the commit of an approved subset of a preview
    pub fn finalize_import(
        &self,
        entries: Vec<PreviewEntry>,
        report_date: NaiveDate,
        override_existing: bool,
    ) -> Result<String> {
        let cache_key = new_key(IMPORT_FINALIZE_PREFIX);
        self.start(Job::FinalizeImport {
            entries,
            report_date,
            override_existing,
            cache_key: cache_key.clone(),
        })?;
        Ok(cache_key)
    }

    /// Queue a banker performance report
    pub fn submit_export(&self, request: ExportRequest) -> Result<String> {
        if let Err(reason) = request.validate() {
            bail!("Invalid export request: {}", reason);
        }
        let cache_key = new_key(EXPORT_REPORT_PREFIX);
        self.start(Job::ExportReport {
            request,
            cache_key: cache_key.clone(),
        })?;
        Ok(cache_key)
    }

    /// Current status of a job; unknown and expired keys are `NotFound`
    pub fn status(&self, cache_key: &str) -> Result<JobStatus> {
        self.channel.status(cache_key)
    }

    /// Re-queue a job under its existing key; the new run's result wins
    pub fn redispatch(&self, job: Job) -> Result<()> {
        self.start(job)
    }

    fn start(&self, job: Job) -> Result<()> {
        let cache_key = job.cache_key().to_string();
        let kind = job.kind();

        self.channel.publish(&cache_key, &JobStatus::Processing)?;

        if let Err(e) = self.queue.dispatch(job) {
            let message = format!("Could not queue job: {}", e);
            self.channel.publish(&cache_key, &JobStatus::failed(&message))?;
            self.log(LogEvent::new("job_dispatch_failed").for_job(kind, &cache_key).with_error(&message));
            bail!(message);
        }

        tracing::debug!(cache_key = %cache_key, kind = %kind, "job dispatched");
        self.log(LogEvent::new("job_submitted").for_job(kind, &cache_key));
        Ok(())
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                tracing::warn!("failed to record log event: {:#}", e);
            }
        }
    }
}

fn new_key(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4())
}

/// Hex SHA-256 of an upload, for correlating resubmissions in the logs
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local_files::LocalFileStore;
    use crate::adapters::memory_cache::MemoryCache;
    use crate::domain::result::{Error, Result as PortResult};
    use crate::services::status_channel::DEFAULT_STATUS_TTL;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Queue that only records what it was given
    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<Job>>,
        refuse: bool,
    }

    impl JobQueue for RecordingQueue {
        fn dispatch(&self, job: Job) -> PortResult<()> {
            if self.refuse {
                return Err(Error::queue("queue is full"));
            }
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    fn orchestrator(dir: &TempDir, queue: Arc<RecordingQueue>) -> JobOrchestrator {
        let channel = StatusChannel::new(Arc::new(MemoryCache::new()), DEFAULT_STATUS_TTL);
        JobOrchestrator::new(Arc::new(LocalFileStore::new(dir.path())), queue, channel)
            .with_max_upload_bytes(16)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
    }

    #[test]
    fn test_submit_stores_file_and_reports_processing() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(RecordingQueue::default());
        let orchestrator = orchestrator(&dir, queue.clone());

        let key = orchestrator.submit_import("Report.CSV", b"cif\nC1\n", date()).unwrap();

        assert!(key.starts_with(IMPORT_PREVIEW_PREFIX));
        assert_eq!(orchestrator.status(&key).unwrap(), JobStatus::Processing);

        let jobs = queue.jobs.lock().unwrap();
        match &jobs[0] {
            Job::ImportPreview { file_path, cache_key, .. } => {
                assert_eq!(cache_key, &key);
                assert!(file_path.starts_with(dir.path().join("imports")));
                assert_eq!(fs::read(file_path).unwrap(), b"cif\nC1\n");
            }
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_uploads() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(RecordingQueue::default());
        let orchestrator = orchestrator(&dir, queue.clone());

        assert!(orchestrator.submit_import("report.pdf", b"x", date()).is_err());
        assert!(orchestrator.submit_import("report", b"x", date()).is_err());
        assert!(orchestrator.submit_import("report.csv", b"", date()).is_err());
        assert!(orchestrator
            .submit_import("report.csv", &[b'a'; 17], date())
            .is_err());
        assert!(queue.jobs.lock().unwrap().is_empty());
    }

    #[test]
    fn test_refused_dispatch_publishes_failure() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(RecordingQueue {
            refuse: true,
            ..Default::default()
        });
        let orchestrator = orchestrator(&dir, queue);

        let err = orchestrator
            .finalize_import(vec![], date(), false)
            .unwrap_err();
        assert!(err.to_string().contains("queue is full"));
    }

    #[test]
    fn test_export_request_is_validated_before_dispatch() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(RecordingQueue::default());
        let orchestrator = orchestrator(&dir, queue.clone());

        let bad = ExportRequest {
            banker_ids: vec![],
            start_date: date(),
            end_date: date(),
            baseline_year: 2024,
        };
        assert!(orchestrator.submit_export(bad).is_err());

        let good = ExportRequest {
            banker_ids: vec![1],
            start_date: date(),
            end_date: date(),
            baseline_year: 2024,
        };
        let key = orchestrator.submit_export(good).unwrap();
        assert!(key.starts_with(EXPORT_REPORT_PREFIX));
        assert_eq!(queue.jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert_eq!(fingerprint(b"").len(), 64);
    }
}
