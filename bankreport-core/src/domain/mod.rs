//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod balance;
mod banker;
pub mod job;
pub mod preview;
pub mod result;
pub mod row;
mod user;

pub use account::{Account, AccountProduct, DEFAULT_CURRENCY};
pub use balance::{AccountTransaction, BankerDailyBalance};
pub use banker::{Banker, Branch, Client};
pub use job::{CommitResult, CommitSkip, ExportRequest, Job, JobKind, JobOutput, JobStatus};
pub use preview::{ImportSummary, PreviewEntry, PreviewResult};
pub use row::{CellValue, Field, FieldError, RawRow, RowError, SheetRow, ValidatedRow};
pub use user::Role;
