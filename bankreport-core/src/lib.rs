//! bankreport core - spreadsheet reconciliation for bank back-office reporting
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Banker, Account, PreviewResult, JobStatus, ...)
//! - **ports**: Trait definitions for external dependencies (Repository, StatusCache, JobQueue, FileStore)
//! - **services**: The import pipeline and the job lifecycle around it
//! - **adapters**: Concrete implementations (DuckDB, DashMap, tokio, local files, csv/calamine)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;
pub mod log_migrations;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use adapters::duckdb::DuckDbRepository;
use adapters::local_files::LocalFileStore;
use adapters::queue::{InlineJobQueue, TokioJobQueue};
use config::Config;
use ports::JobQueue;
use services::*;

// Re-export commonly used types at crate root
pub use domain::{
    Account, Banker, Client, CommitResult, ExportRequest, ImportSummary, Job, JobKind, JobOutput,
    JobStatus, PreviewEntry, PreviewResult, Role, RowError,
};
pub use domain::result::{Error, OperationResult};
pub use services::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};

const DB_FILENAME: &str = "bankreport.duckdb";

/// How submitted jobs are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// On tokio's blocking pool; requires a running runtime
    Background,
    /// On the submitting thread, before `submit` returns
    Inline,
}

/// Main context for bankreport operations
///
/// Wires the DuckDB store (which doubles as the durable status cache), the
/// local file store, the job queue and the services on top of them.
pub struct BankReportContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub repository: Arc<DuckDbRepository>,
    pub channel: StatusChannel,
    pub orchestrator: JobOrchestrator,
    pub status_service: StatusService,
    background: Option<Arc<TokioJobQueue>>,
}

impl BankReportContext {
    /// Create a context over `data_dir`, loading its settings.json
    pub fn new(data_dir: &Path, mode: QueueMode) -> Result<Self> {
        let config = Config::load(data_dir)?;
        Self::with_config(data_dir, config, mode, None)
    }

    pub fn with_config(
        data_dir: &Path,
        config: Config,
        mode: QueueMode,
        logger: Option<Arc<LoggingService>>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(DB_FILENAME))?);
        repository.ensure_schema()?;

        let files = Arc::new(LocalFileStore::new(data_dir));
        let channel = StatusChannel::new(repository.clone(), config.cache_ttl);

        let mut worker = JobWorker::new(
            repository.clone(),
            files.clone(),
            channel.clone(),
            config.worker_settings(),
        );
        if let Some(logger) = &logger {
            worker = worker.with_logger(Arc::new(logger.reopen_as(EntryPoint::Worker)?));
        }
        let worker = Arc::new(worker);

        let (queue, background) = match mode {
            QueueMode::Background => {
                let queue = Arc::new(TokioJobQueue::new(worker)?);
                (queue.clone() as Arc<dyn JobQueue>, Some(queue))
            }
            QueueMode::Inline => (Arc::new(InlineJobQueue::new(worker)) as Arc<dyn JobQueue>, None),
        };

        let mut orchestrator = JobOrchestrator::new(files, queue, channel.clone())
            .with_max_upload_bytes(config.max_upload_bytes);
        if let Some(logger) = logger {
            orchestrator = orchestrator.with_logger(logger);
        }

        let status_service = StatusService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            repository,
            channel,
            orchestrator,
            status_service,
            background,
        })
    }

    /// The completed preview cached under `cache_key`
    pub fn cached_preview(&self, cache_key: &str) -> Result<PreviewResult> {
        match self.orchestrator.status(cache_key)? {
            JobStatus::Completed {
                output: JobOutput::Preview { data },
            } => Ok(data),
            JobStatus::Completed { .. } => bail!("{} is not an import preview", cache_key),
            JobStatus::Processing => bail!("Preview {} is still processing", cache_key),
            JobStatus::Failed { message } => bail!("Preview {} failed: {}", cache_key, message),
            JobStatus::NotFound => bail!("No preview found for {} (unknown or expired)", cache_key),
        }
    }

    /// Wait for background jobs dispatched from this context to finish
    pub async fn wait_idle(&self) {
        if let Some(queue) = &self.background {
            queue.wait_idle().await;
        }
    }
}
