//! Status cache port - key-value store with per-entry TTL

use std::time::Duration;

use crate::domain::result::Result;

/// Key-value cache used as the result/status channel between background
/// jobs and polling clients.
///
/// Writes are last-writer-wins. An expired entry must be indistinguishable
/// from one that was never written.
pub trait StatusCache: Send + Sync {
    /// Store `value` under `key`, replacing any previous value; the TTL
    /// restarts from this write
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Read the live value under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove `key` if present
    fn forget(&self, key: &str) -> Result<()>;
}
