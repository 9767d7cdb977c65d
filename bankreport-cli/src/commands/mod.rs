//! CLI command implementations

pub mod export;
pub mod import;
pub mod logs;
pub mod new;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use bankreport_core::config::Config;
use bankreport_core::{BankReportContext, EntryPoint, JobStatus, LogEvent, LoggingService, QueueMode, Role};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the data directory from `BANKREPORT_DIR` or default to `~/.bankreport`
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("BANKREPORT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".bankreport"))
        .ok_or_else(|| anyhow!("Could not find home directory; set BANKREPORT_DIR"))
}

pub fn get_config() -> Result<Config> {
    Config::load(&get_data_dir()?)
}

/// Role of the caller; `BANKREPORT_ROLE`, admin when unset
pub fn get_role() -> Result<Role> {
    Ok(get_config()?.role)
}

/// Context whose jobs run on the calling thread
pub fn get_context() -> Result<BankReportContext> {
    let data_dir = get_data_dir()?;
    // DuckDB allows one writing process per file: while another brp command
    // is still running a job, opening waits through the retry window and fails
    BankReportContext::new(&data_dir, QueueMode::Inline).context(
        "Failed to open the bankreport database (is another brp command still running?)",
    )
}

/// A context with a tokio runtime behind its job queue
///
/// Jobs keep running while the command polls; `finish` waits for them so
/// the process never exits with a job still writing.
pub struct Session {
    pub ctx: BankReportContext,
    pub logger: Option<Arc<LoggingService>>,
    runtime: Runtime,
}

impl Session {
    pub fn open() -> Result<Self> {
        let data_dir = get_data_dir()?;
        let config = Config::load(&data_dir)?;
        let logger = get_logger().map(Arc::new);
        let runtime = Runtime::new().context("Failed to start job runtime")?;

        let ctx = {
            let _guard = runtime.enter();
            BankReportContext::with_config(&data_dir, config, QueueMode::Background, logger.clone())
                .context("Failed to initialize bankreport context")?
        };
        if let Err(e) = ctx.status_service.purge_expired_jobs() {
            tracing::warn!("could not purge expired job statuses: {:#}", e);
        }

        Ok(Self { ctx, logger, runtime })
    }

    /// Poll `cache_key` until its job reaches a terminal status
    pub fn wait_for(&self, cache_key: &str, label: &str, quiet: bool) -> Result<JobStatus> {
        let spinner = if quiet || !atty::is(atty::Stream::Stderr) {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(label.to_string());
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb
        };

        let started = Instant::now();
        let status = loop {
            let status = self.ctx.orchestrator.status(cache_key)?;
            if status.is_terminal() {
                break status;
            }
            if matches!(status, JobStatus::NotFound) {
                spinner.finish_and_clear();
                bail!("Job {} disappeared from the status cache", cache_key);
            }
            if started.elapsed() > self.ctx.config.poll_timeout {
                spinner.finish_and_clear();
                bail!(
                    "Timed out after {}s waiting for {}; check later with `brp import status {}`",
                    self.ctx.config.poll_timeout.as_secs(),
                    cache_key,
                    cache_key
                );
            }
            thread::sleep(self.ctx.config.poll_interval);
        };

        spinner.finish_and_clear();
        Ok(status)
    }

    /// Wait for outstanding jobs, then shut the runtime down
    pub fn finish(self) {
        self.runtime.block_on(self.ctx.wait_idle());
    }
}
