//! Job queue port - background execution of long-running work

use crate::domain::result::Result;
use crate::domain::Job;

/// Executes jobs asynchronously, at least once.
///
/// `dispatch` must return without waiting for the job to finish. The job
/// itself is responsible for publishing its terminal status.
pub trait JobQueue: Send + Sync {
    fn dispatch(&self, job: Job) -> Result<()>;
}
