//! In-process status cache backed by a concurrent map

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::result::Result;
use crate::ports::StatusCache;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local `StatusCache`; entries expire lazily on read
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StatusCache for MemoryCache {
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Expired: drop it, but only if nobody rewrote it meanwhile
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    fn forget(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
