//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations, so any of
//! them can be swapped (a real message queue for the cache channel, an
//! object store for the file store) without touching the pipeline.

mod cache;
mod file_store;
mod queue;
mod repository;

pub use cache::StatusCache;
pub use file_store::{FileStore, StorageArea};
pub use queue::JobQueue;
pub use repository::{BalanceUpdate, BalanceUpdateOutcome, Repository};
