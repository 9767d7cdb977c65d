//! Typed job status over the raw cache port
//!
//! The cache only knows strings. This wrapper owns the JSON encoding and the
//! TTL so every writer publishes the same wire format.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::domain::JobStatus;
use crate::ports::StatusCache;

/// Default lifetime of a status entry, counted from its last write
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct StatusChannel {
    cache: Arc<dyn StatusCache>,
    ttl: Duration,
}

impl StatusChannel {
    pub fn new(cache: Arc<dyn StatusCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Publish a status; the last write for a key wins
    pub fn publish(&self, key: &str, status: &JobStatus) -> Result<()> {
        let payload = serde_json::to_string(status)?;
        self.cache
            .put(key, &payload, self.ttl)
            .with_context(|| format!("Failed to publish status for {}", key))?;
        Ok(())
    }

    /// Current status; absent or expired keys read as `NotFound`
    pub fn status(&self, key: &str) -> Result<JobStatus> {
        match self.cache.get(key)? {
            None => Ok(JobStatus::NotFound),
            Some(payload) => serde_json::from_str(&payload)
                .with_context(|| format!("Corrupt status payload under {}", key)),
        }
    }

    /// Raw payload as stored, for clients that relay it untouched
    pub fn raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key)?)
    }

    pub fn forget(&self, key: &str) -> Result<()> {
        Ok(self.cache.forget(key)?)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
