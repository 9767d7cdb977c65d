//! Job queue adapters
//!
//! - `TokioJobQueue`: runs each job on tokio's blocking pool; returns from
//!   `dispatch` immediately
//! - `InlineJobQueue`: runs the job before `dispatch` returns (tests and
//!   scripted use)
//!
//! Both turn a panicking job into a `failed` status instead of losing it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::domain::result::{Error, Result};
use crate::domain::Job;
use crate::ports::JobQueue;
use crate::services::worker::JobWorker;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {}", s)
    } else {
        "job panicked".to_string()
    }
}

pub struct TokioJobQueue {
    handle: Handle,
    worker: Arc<JobWorker>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioJobQueue {
    /// Queue on the runtime this is called from
    pub fn new(worker: Arc<JobWorker>) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::queue(format!("no tokio runtime available: {}", e)))?;
        Ok(Self::with_handle(handle, worker))
    }

    pub fn with_handle(handle: Handle, worker: Arc<JobWorker>) -> Self {
        Self {
            handle,
            worker,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Wait until every job dispatched so far has finished
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl JobQueue for TokioJobQueue {
    fn dispatch(&self, job: Job) -> Result<()> {
        let worker = Arc::clone(&self.worker);
        let cache_key = job.cache_key().to_string();
        let kind = job.kind();

        let task = self.handle.spawn(async move {
            let runner = Arc::clone(&worker);
            let joined = tokio::task::spawn_blocking(move || runner.run(job)).await;
            if let Err(e) = joined {
                let message = if e.is_panic() {
                    panic_message(e.into_panic().as_ref())
                } else {
                    format!("job was cancelled: {}", e)
                };
                worker.fail(&cache_key, kind, &message);
            }
        });

        let mut pending = self
            .pending
            .lock()
            .map_err(|e| Error::queue(format!("queue lock poisoned: {}", e)))?;
        pending.retain(|h| !h.is_finished());
        pending.push(task);
        Ok(())
    }
}

pub struct InlineJobQueue {
    worker: Arc<JobWorker>,
}

impl InlineJobQueue {
    pub fn new(worker: Arc<JobWorker>) -> Self {
        Self { worker }
    }
}

impl JobQueue for InlineJobQueue {
    fn dispatch(&self, job: Job) -> Result<()> {
        let cache_key = job.cache_key().to_string();
        let kind = job.kind();
        let worker = &self.worker;

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| worker.run(job))) {
            worker.fail(&cache_key, kind, &panic_message(payload.as_ref()));
        }
        Ok(())
    }
}
