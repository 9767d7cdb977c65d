//! Event log schema for `logs.duckdb`
//!
//! Kept apart from the store migrations: the event log lives in its own file
//! and is migrated by its own `MigrationService`, so clearing or losing it
//! never touches balances or the job cache.

/// `(name, sql)` in apply order; `000_migrations.sql` bootstraps tracking
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
