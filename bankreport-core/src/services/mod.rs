//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The import
//! pipeline is validator -> resolver -> importer -> commit; the orchestrator
//! and worker wrap it in background jobs whose progress travels through the
//! status channel.

pub mod commit;
pub mod export;
pub mod importer;
pub mod logging;
pub mod migration;
pub mod orchestrator;
pub mod resolver;
mod status;
pub mod status_channel;
pub mod validator;
pub mod worker;

pub use commit::CommitService;
pub use export::{ExportService, ReportFile};
pub use importer::RowImporter;
pub use logging::{EntryPoint, EventCount, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use orchestrator::JobOrchestrator;
pub use resolver::{EntityResolver, ResolverStats};
pub use status::{BankerSummary, StatusService, StatusSummary};
pub use status_channel::StatusChannel;
pub use validator::RowValidator;
pub use worker::{JobWorker, WorkerSettings};
