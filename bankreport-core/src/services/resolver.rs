//! Entity resolution - natural keys from a row to store records
//!
//! A resolver lives for exactly one import run. Every lookup, including a
//! miss, is remembered so a file that mentions the same banker on ten
//! thousand rows costs one query.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::result::Result;
use crate::domain::{Account, Banker, Client};
use crate::ports::Repository;

/// Lookup counters, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub queries: usize,
    pub memo_hits: usize,
}

pub struct EntityResolver {
    repository: Arc<dyn Repository>,
    bankers: HashMap<String, Option<Banker>>,
    clients: HashMap<String, Option<Client>>,
    accounts: HashMap<String, Option<Account>>,
    stats: ResolverStats,
}

impl EntityResolver {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            bankers: HashMap::new(),
            clients: HashMap::new(),
            accounts: HashMap::new(),
            stats: ResolverStats::default(),
        }
    }

    /// Banker by personnel code
    pub fn find_banker(&mut self, code: &str) -> Result<Option<Banker>> {
        let key = Banker::normalize_code(code);
        if let Some(hit) = self.bankers.get(&key) {
            self.stats.memo_hits += 1;
            return Ok(hit.clone());
        }
        self.stats.queries += 1;
        let found = self.repository.find_banker_by_code(&key)?;
        self.bankers.insert(key, found.clone());
        Ok(found)
    }

    /// Client by CIF
    pub fn find_client(&mut self, cif: &str) -> Result<Option<Client>> {
        let key = cif.trim().to_string();
        if let Some(hit) = self.clients.get(&key) {
            self.stats.memo_hits += 1;
            return Ok(hit.clone());
        }
        self.stats.queries += 1;
        let found = self.repository.find_client_by_cif(&key)?;
        self.clients.insert(key, found.clone());
        Ok(found)
    }

    /// Account by number; `None` means the row describes a new account
    pub fn find_account(&mut self, account_number: &str) -> Result<Option<Account>> {
        let key = Account::normalize_number(account_number);
        if let Some(hit) = self.accounts.get(&key) {
            self.stats.memo_hits += 1;
            return Ok(hit.clone());
        }
        self.stats.queries += 1;
        let found = self.repository.find_account_by_number(&key)?;
        self.accounts.insert(key, found.clone());
        Ok(found)
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }
}
