//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port and the durable StatusCache
//! - DashMap for an in-process StatusCache
//! - tokio's blocking pool (or the calling thread) for the JobQueue
//! - Local filesystem for the FileStore
//! - csv and calamine for reading uploaded spreadsheets

pub mod duckdb;
pub mod local_files;
pub mod memory_cache;
pub mod queue;
pub mod spreadsheet;
