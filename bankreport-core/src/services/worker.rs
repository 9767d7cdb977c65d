//! Background job execution
//!
//! `JobWorker::run` is the whole contract between a queue and the pipeline:
//! it takes a job, does the work, and publishes exactly one terminal status.
//! Errors never escape it; they become `{status: failed}` payloads.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::{Job, JobKind, JobOutput, JobStatus};
use crate::ports::{FileStore, Repository};
use crate::services::commit::{CommitService, DEFAULT_COMMIT_CHUNK_SIZE};
use crate::services::export::ExportService;
use crate::services::importer::{RowImporter, DEFAULT_CHUNK_SIZE};
use crate::services::logging::{LogEvent, LoggingService};
use crate::services::status_channel::StatusChannel;
use crate::services::validator::RowValidator;

/// Tunables a worker applies to every job
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub import_chunk_size: usize,
    pub commit_chunk_size: usize,
    pub default_currency: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            import_chunk_size: DEFAULT_CHUNK_SIZE,
            commit_chunk_size: DEFAULT_COMMIT_CHUNK_SIZE,
            default_currency: crate::domain::DEFAULT_CURRENCY.to_string(),
        }
    }
}

pub struct JobWorker {
    repository: Arc<dyn Repository>,
    files: Arc<dyn FileStore>,
    channel: StatusChannel,
    settings: WorkerSettings,
    logger: Option<Arc<LoggingService>>,
}

impl JobWorker {
    pub fn new(
        repository: Arc<dyn Repository>,
        files: Arc<dyn FileStore>,
        channel: StatusChannel,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            repository,
            files,
            channel,
            settings,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Execute a job and publish its terminal status
    pub fn run(&self, job: Job) {
        let cache_key = job.cache_key().to_string();
        let kind = job.kind();
        tracing::info!(cache_key = %cache_key, kind = %kind, "job started");

        match self.execute(job) {
            Ok(output) => {
                let event = match &output {
                    // Completed job, but a chunk was rolled back
                    JobOutput::Commit { data } if !data.success => {
                        tracing::warn!(cache_key = %cache_key, "commit incomplete: {}", data.message);
                        LogEvent::new(failed_event(kind))
                            .for_job(kind, &cache_key)
                            .with_error(&data.message)
                    }
                    _ => {
                        tracing::info!(cache_key = %cache_key, kind = %kind, "job completed");
                        LogEvent::new(completed_event(kind)).for_job(kind, &cache_key)
                    }
                };
                self.publish(&cache_key, &JobStatus::completed(output));
                self.log(event);
            }
            Err(e) => self.fail(&cache_key, kind, &format!("{:#}", e)),
        }
    }

    /// Publish a failure for a job that could not run to completion
    ///
    /// Queues call this when the job panicked.
    pub fn fail(&self, cache_key: &str, kind: JobKind, message: &str) {
        tracing::warn!(cache_key = %cache_key, kind = %kind, "job failed: {}", message);
        self.publish(cache_key, &JobStatus::failed(message));
        self.log(
            LogEvent::new(failed_event(kind))
                .for_job(kind, cache_key)
                .with_error(message),
        );
    }

    fn execute(&self, job: Job) -> Result<JobOutput> {
        match job {
            Job::ImportPreview {
                file_path,
                report_date,
                ..
            } => {
                let validator =
                    RowValidator::default().with_default_currency(&self.settings.default_currency);
                let mut importer = RowImporter::new(Arc::clone(&self.repository), report_date)
                    .with_validator(validator)
                    .with_chunk_size(self.settings.import_chunk_size);
                importer.import_file(&file_path)?;
                Ok(JobOutput::Preview {
                    data: importer.finish(),
                })
            }
            Job::FinalizeImport {
                entries,
                report_date,
                override_existing,
                ..
            } => {
                let data = CommitService::new(Arc::clone(&self.repository))
                    .with_chunk_size(self.settings.commit_chunk_size)
                    .commit(&entries, report_date, override_existing)?;
                Ok(JobOutput::Commit { data })
            }
            Job::ExportReport { request, cache_key } => {
                let report = ExportService::new(Arc::clone(&self.repository), Arc::clone(&self.files))
                    .generate(&request, &cache_key)?;
                Ok(JobOutput::Report {
                    file_path: report.file_path.display().to_string(),
                    file_name: report.file_name,
                })
            }
        }
    }

    fn publish(&self, cache_key: &str, status: &JobStatus) {
        // Nothing left to report to if the cache itself is down
        if let Err(e) = self.channel.publish(cache_key, status) {
            tracing::error!(cache_key = %cache_key, "could not publish job status: {:#}", e);
        }
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log(event) {
                tracing::warn!("failed to record log event: {:#}", e);
            }
        }
    }
}

fn completed_event(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ImportPreview => "import_completed",
        JobKind::FinalizeImport => "commit_completed",
        JobKind::ExportReport => "export_completed",
    }
}

fn failed_event(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ImportPreview => "import_failed",
        JobKind::FinalizeImport => "commit_failed",
        JobKind::ExportReport => "export_failed",
    }
}
