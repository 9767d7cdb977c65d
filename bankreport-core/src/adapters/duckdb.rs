//! DuckDB repository implementation
//!
//! One connection behind a mutex serves both the `Repository` port and the
//! table-backed `StatusCache`. Decimals cross the boundary as strings so no
//! precision is lost to `f64`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::types::Value;
use duckdb::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountProduct, AccountTransaction, Banker, BankerDailyBalance, Branch, Client,
};
use crate::ports::{BalanceUpdate, BalanceUpdateOutcome, Repository, StatusCache};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str = "id, account_number, client_id, banker_id, product_id, currency,
     CAST(current_balance AS VARCHAR), CAST(available_balance AS VARCHAR),
     created_at::VARCHAR, updated_at::VARCHAR";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Row counts per table, for `brp status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub branches: i64,
    pub products: i64,
    pub bankers: i64,
    pub clients: i64,
    pub accounts: i64,
    pub balance_records: i64,
    pub cached_jobs: i64,
    pub latest_report_date: Option<NaiveDate>,
}

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock, e.g. a CLI invocation racing a long running commit.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Throwaway in-memory database
    pub fn in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; nothing here needs more than the core engine
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Ok(conn)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Connection lock poisoned: {}", e)))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    // === Reference data ===
    //
    // Record management belongs to a separate application; these inserts
    // exist so the CLI and tests can seed a store.

    pub fn add_branch(&self, code: &str, name: &str) -> Result<Branch> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO branches (code, name) VALUES (?, ?) RETURNING id",
            params![code.trim(), name.trim()],
            |row| row.get(0),
        )?;
        Ok(Branch {
            id,
            code: code.trim().to_string(),
            name: name.trim().to_string(),
        })
    }

    pub fn add_product(&self, code: &str, name: &str) -> Result<AccountProduct> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO account_products (code, name) VALUES (?, ?) RETURNING id",
            params![code.trim(), name.trim()],
            |row| row.get(0),
        )?;
        Ok(AccountProduct {
            id,
            code: code.trim().to_string(),
            name: name.trim().to_string(),
        })
    }

    pub fn add_banker(&self, code: &str, name: &str, branch_id: Option<i64>) -> Result<Banker> {
        let code = Banker::normalize_code(code);
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO bankers (code, name, branch_id) VALUES (?, ?, ?) RETURNING id",
            params![code, name.trim(), branch_id],
            |row| row.get(0),
        )?;
        Ok(Banker {
            id,
            code,
            name: name.trim().to_string(),
            branch_id,
        })
    }

    pub fn add_client(&self, cif: &str, name: &str) -> Result<Client> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO clients (cif, name) VALUES (?, ?) RETURNING id",
            params![cif.trim(), name.trim()],
            |row| row.get(0),
        )?;
        Ok(Client {
            id,
            cif: cif.trim().to_string(),
            name: name.trim().to_string(),
        })
    }

    /// Insert an account; returns it with the assigned id
    pub fn add_account(&self, account: &Account) -> Result<Account> {
        account.validate().map_err(Error::validation)?;
        let number = Account::normalize_number(&account.account_number);
        let currency = Account::normalize_currency(&account.currency);

        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO accounts (account_number, client_id, banker_id, product_id, currency,
                                   current_balance, available_balance)
             VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(20, 2)), CAST(? AS DECIMAL(20, 2)))
             RETURNING id",
            params![
                number,
                account.client_id,
                account.banker_id,
                account.product_id,
                currency,
                account.current_balance.to_string(),
                account.available_balance.to_string(),
            ],
            |row| row.get(0),
        )?;

        Ok(Account {
            id,
            account_number: number,
            currency,
            ..account.clone()
        })
    }

    pub fn list_bankers(&self) -> Result<Vec<Banker>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, code, name, branch_id FROM bankers ORDER BY code")?;
        let rows = stmt.query_map([], row_to_banker)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    pub fn find_product_by_code(&self, code: &str) -> Result<Option<AccountProduct>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, code, name FROM account_products WHERE code = ?")?;
        let mut rows = stmt.query([code.trim()])?;
        match rows.next()? {
            Some(row) => Ok(Some(AccountProduct {
                id: row.get(0)?,
                code: row.get(1)?,
                name: row.get(2)?,
            })),
            None => Ok(None),
        }
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?)
        };
        let latest: Option<String> = conn.query_row(
            "SELECT MAX(report_date)::VARCHAR FROM account_transactions",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreCounts {
            branches: count("branches")?,
            products: count("account_products")?,
            bankers: count("bankers")?,
            clients: count("clients")?,
            accounts: count("accounts")?,
            balance_records: count("account_transactions")?,
            cached_jobs: count("sys_job_cache")?,
            latest_report_date: latest.as_deref().and_then(parse_date),
        })
    }

    /// Drop cache rows whose TTL has passed; returns the number removed
    pub fn purge_expired_cache(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM sys_job_cache WHERE expires_at_ms <= ?",
            [now_ms()],
        )?;
        Ok(removed)
    }

    // === Balance updates ===

    /// Apply one update; runs inside the caller's transaction
    fn apply_one(
        conn: &Connection,
        report_date: NaiveDate,
        update: &BalanceUpdate,
        override_existing: bool,
    ) -> Result<BalanceUpdateOutcome> {
        let date = report_date.to_string();
        let number = Account::normalize_number(&update.account_number);

        let current = {
            let mut stmt = conn.prepare(
                "SELECT id, CAST(current_balance AS VARCHAR) FROM accounts WHERE account_number = ?",
            )?;
            let mut rows = stmt.query([&number])?;
            match rows.next()? {
                Some(row) => {
                    let id: i64 = row.get(0)?;
                    let balance: String = row.get(1)?;
                    Some((id, parse_decimal(&balance)))
                }
                None => None,
            }
        };
        let Some((account_id, previous_balance)) = current else {
            return Ok(BalanceUpdateOutcome::AccountNotFound);
        };

        let existing: Option<i64> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM account_transactions
                 WHERE account_id = ? AND report_date = CAST(? AS DATE)",
            )?;
            let mut rows = stmt.query(params![account_id, date])?;
            match rows.next()? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        let outcome = match existing {
            Some(_) if !override_existing => {
                return Ok(BalanceUpdateOutcome::AlreadyRecorded { account_id });
            }
            Some(history_id) => {
                // previous_balance keeps the value from the first application
                conn.execute(
                    "UPDATE account_transactions
                     SET banker_id = ?,
                         balance = CAST(? AS DECIMAL(20, 2)),
                         available_balance = CAST(? AS DECIMAL(20, 2)),
                         source = 'import',
                         updated_at = current_timestamp
                     WHERE id = ?",
                    params![
                        update.banker_id,
                        update.balance.to_string(),
                        update.available_balance.to_string(),
                        history_id,
                    ],
                )?;
                BalanceUpdateOutcome::Replaced { account_id }
            }
            None => {
                conn.execute(
                    "INSERT INTO account_transactions
                        (account_id, banker_id, report_date, previous_balance, balance,
                         available_balance, source)
                     VALUES (?, ?, CAST(? AS DATE), CAST(? AS DECIMAL(20, 2)),
                             CAST(? AS DECIMAL(20, 2)), CAST(? AS DECIMAL(20, 2)), 'import')",
                    params![
                        account_id,
                        update.banker_id,
                        date,
                        previous_balance.to_string(),
                        update.balance.to_string(),
                        update.available_balance.to_string(),
                    ],
                )?;
                BalanceUpdateOutcome::Applied { account_id }
            }
        };

        // A backdated report records history but leaves the current balance alone
        let newer: i64 = conn.query_row(
            "SELECT COUNT(*) FROM account_transactions
             WHERE account_id = ? AND report_date > CAST(? AS DATE)",
            params![account_id, date],
            |row| row.get(0),
        )?;
        if newer == 0 {
            conn.execute(
                "UPDATE accounts
                 SET current_balance = CAST(? AS DECIMAL(20, 2)),
                     available_balance = CAST(? AS DECIMAL(20, 2)),
                     banker_id = ?,
                     updated_at = current_timestamp
                 WHERE id = ?",
                params![
                    update.balance.to_string(),
                    update.available_balance.to_string(),
                    update.banker_id,
                    account_id,
                ],
            )?;
        }

        Ok(outcome)
    }
}

impl Repository for DuckDbRepository {
    fn find_banker_by_code(&self, code: &str) -> Result<Option<Banker>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, code, name, branch_id FROM bankers WHERE code = ?")?;
        let mut rows = stmt.query([Banker::normalize_code(code)])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_banker(row)?)),
            None => Ok(None),
        }
    }

    fn find_client_by_cif(&self, cif: &str) -> Result<Option<Client>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, cif, name FROM clients WHERE cif = ?")?;
        let mut rows = stmt.query([cif.trim()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Client {
                id: row.get(0)?,
                cif: row.get(1)?,
                name: row.get(2)?,
            })),
            None => Ok(None),
        }
    }

    fn find_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE account_number = ?",
            ACCOUNT_COLUMNS
        ))?;
        let mut rows = stmt.query([Account::normalize_number(account_number)])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_account(row)?)),
            None => Ok(None),
        }
    }

    fn get_bankers_by_ids(&self, ids: &[i64]) -> Result<Vec<Banker>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, code, name, branch_id FROM bankers WHERE id IN ({}) ORDER BY id",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_banker)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn apply_balance_updates(
        &self,
        report_date: NaiveDate,
        updates: &[BalanceUpdate],
        override_existing: bool,
    ) -> Result<Vec<BalanceUpdateOutcome>> {
        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction()?;

        let mut outcomes = Vec::with_capacity(updates.len());
        for update in updates {
            outcomes.push(Self::apply_one(&tx, report_date, update, override_existing)?);
        }

        tx.commit()?;
        Ok(outcomes)
    }

    fn get_account_transactions(&self, account_id: i64) -> Result<Vec<AccountTransaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, banker_id, report_date::VARCHAR,
                    CAST(previous_balance AS VARCHAR), CAST(balance AS VARCHAR),
                    CAST(available_balance AS VARCHAR), source,
                    created_at::VARCHAR, updated_at::VARCHAR
             FROM account_transactions
             WHERE account_id = ?
             ORDER BY report_date",
        )?;
        let rows = stmt.query_map([account_id], |row| {
            let report_date: String = row.get(3)?;
            let previous: String = row.get(4)?;
            let balance: String = row.get(5)?;
            let available: String = row.get(6)?;
            let created: String = row.get(8)?;
            let updated: String = row.get(9)?;
            Ok(AccountTransaction {
                id: row.get(0)?,
                account_id: row.get(1)?,
                banker_id: row.get(2)?,
                report_date: parse_date(&report_date).unwrap_or_default(),
                previous_balance: parse_decimal(&previous),
                balance: parse_decimal(&balance),
                available_balance: parse_decimal(&available),
                source: row.get(7)?,
                created_at: parse_timestamp(&created),
                updated_at: parse_timestamp(&updated),
            })
        })?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn get_banker_daily_balances(
        &self,
        banker_ids: &[i64],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BankerDailyBalance>> {
        if banker_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT banker_id, report_date::VARCHAR, CAST(SUM(balance) AS VARCHAR), COUNT(*)
             FROM account_transactions
             WHERE banker_id IN ({})
               AND report_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)
             GROUP BY banker_id, report_date
             ORDER BY banker_id, report_date",
            placeholders(banker_ids.len())
        );

        let mut args: Vec<Value> = banker_ids.iter().map(|id| Value::BigInt(*id)).collect();
        args.push(Value::Text(start.to_string()));
        args.push(Value::Text(end.to_string()));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            let report_date: String = row.get(1)?;
            let total: String = row.get(2)?;
            Ok(BankerDailyBalance {
                banker_id: row.get(0)?,
                report_date: parse_date(&report_date).unwrap_or_default(),
                total_balance: parse_decimal(&total),
                account_count: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn get_banker_balances_as_of(
        &self,
        banker_ids: &[i64],
        as_of: NaiveDate,
    ) -> Result<Vec<(i64, Decimal)>> {
        if banker_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "WITH latest AS (
                 SELECT banker_id, balance,
                        ROW_NUMBER() OVER (PARTITION BY account_id ORDER BY report_date DESC) AS rn
                 FROM account_transactions
                 WHERE report_date <= CAST(? AS DATE)
             )
             SELECT banker_id, CAST(SUM(balance) AS VARCHAR)
             FROM latest
             WHERE rn = 1 AND banker_id IN ({})
             GROUP BY banker_id
             ORDER BY banker_id",
            placeholders(banker_ids.len())
        );

        let mut args = vec![Value::Text(as_of.to_string())];
        args.extend(banker_ids.iter().map(|id| Value::BigInt(*id)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            let total: String = row.get(1)?;
            Ok((row.get::<_, i64>(0)?, parse_decimal(&total)))
        })?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }
}

impl StatusCache for DuckDbRepository {
    fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = now_ms() + ttl.as_millis() as i64;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_job_cache (cache_key, payload, expires_at_ms) VALUES (?, ?, ?)
             ON CONFLICT (cache_key) DO UPDATE
             SET payload = EXCLUDED.payload, expires_at_ms = EXCLUDED.expires_at_ms",
            params![key, value, expires_at],
        )
        .map_err(|e| Error::cache(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload FROM sys_job_cache WHERE cache_key = ? AND expires_at_ms > ?",
        )?;
        let mut rows = stmt.query(params![key, now_ms()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn forget(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sys_job_cache WHERE cache_key = ?", [key])?;
        Ok(())
    }
}

// Helper functions

fn row_to_banker(row: &duckdb::Row) -> duckdb::Result<Banker> {
    Ok(Banker {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        branch_id: row.get(3)?,
    })
}

fn row_to_account(row: &duckdb::Row) -> duckdb::Result<Account> {
    // Column order follows ACCOUNT_COLUMNS
    let current: String = row.get(6)?;
    let available: String = row.get(7)?;
    let created: String = row.get(8)?;
    let updated: String = row.get(9)?;
    Ok(Account {
        id: row.get(0)?,
        account_number: row.get(1)?,
        client_id: row.get(2)?,
        banker_id: row.get(3)?,
        product_id: row.get(4)?,
        currency: row.get(5)?,
        current_balance: parse_decimal(&current),
        available_balance: parse_decimal(&available),
        created_at: parse_timestamp(&created),
        updated_at: parse_timestamp(&updated),
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn parse_decimal(s: &str) -> Decimal {
    s.trim().parse().unwrap_or_default()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}
