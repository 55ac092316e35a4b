//! In-memory balance store
//!
//! Used by tests and by local dry runs without Postgres. Every operation
//! yields to the scheduler first so concurrent callers interleave the way
//! they would against a remote database.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use num_bigint::BigUint;

use super::error::LedgerError;
use super::models::{AddressType, Balance};
use super::namespace::TenantNamespace;
use super::store::BalanceStore;

#[derive(Default)]
pub struct MemoryBalanceStore {
    tables: Mutex<HashMap<String, Vec<Balance>>>,
    /// Tables touched by any operation, for isolation checks
    accessed: Mutex<HashSet<String>>,
    fail_saves: AtomicBool,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save_balance` fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Current rows of a tenant table, ordered by (address, token)
    pub fn rows(&self, ns: &TenantNamespace) -> Vec<Balance> {
        let tables = self.tables.lock().unwrap();
        let mut rows = tables.get(ns.table()).cloned().unwrap_or_default();
        rows.sort_by(|a, b| {
            (&a.address, &a.token_address).cmp(&(&b.address, &b.token_address))
        });
        rows
    }

    pub fn accessed_tables(&self) -> HashSet<String> {
        self.accessed.lock().unwrap().clone()
    }

    async fn enter(&self, ns: &TenantNamespace) {
        tokio::task::yield_now().await;
        self.accessed.lock().unwrap().insert(ns.table().to_string());
    }

    fn find<F>(&self, ns: &TenantNamespace, pred: F) -> Option<Balance>
    where
        F: Fn(&Balance) -> bool,
    {
        let tables = self.tables.lock().unwrap();
        tables
            .get(ns.table())
            .and_then(|rows| rows.iter().find(|row| pred(row)).cloned())
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn query_balance(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        self.enter(ns).await;
        Ok(self.find(ns, |row| row.is_pair(address, token_address)))
    }

    async fn query_balance_by_role(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
        address_type: AddressType,
    ) -> Result<Option<Balance>, LedgerError> {
        self.enter(ns).await;
        Ok(self.find(ns, |row| {
            row.is_pair(address, token_address) && row.address_type == address_type
        }))
    }

    async fn query_balance_by_address(
        &self,
        ns: &TenantNamespace,
        address: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        self.enter(ns).await;
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(ns.table()).and_then(|rows| {
            rows.iter()
                .filter(|row| row.address == address)
                .min_by_key(|row| (Reverse(i16::from(row.address_type)), row.token_address.clone()))
                .cloned()
        }))
    }

    async fn list_balances(
        &self,
        ns: &TenantNamespace,
        address_type: Option<AddressType>,
        min_balance: &BigUint,
    ) -> Result<Vec<Balance>, LedgerError> {
        self.enter(ns).await;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(ns.table())
            .map(|rows| {
                rows.iter()
                    .filter(|row| address_type.is_none_or(|t| row.address_type == t))
                    .filter(|row| &row.balance >= min_balance)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_balances(
        &self,
        ns: &TenantNamespace,
        rows: &[Balance],
    ) -> Result<(), LedgerError> {
        self.enter(ns).await;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(ns.table().to_string()).or_default();

        // Validate the whole batch before touching the table
        let mut seen: HashSet<(&str, &str)> = table
            .iter()
            .map(|row| (row.address.as_str(), row.token_address.as_str()))
            .collect();
        for row in rows {
            if !seen.insert((row.address.as_str(), row.token_address.as_str())) {
                return Err(LedgerError::Persist(format!(
                    "duplicate key ({}, {}) in {}",
                    row.address, row.token_address, ns
                )));
            }
        }

        table.extend(rows.iter().cloned());
        Ok(())
    }

    async fn save_balance(&self, ns: &TenantNamespace, row: &Balance) -> Result<(), LedgerError> {
        self.enter(ns).await;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(LedgerError::Persist("simulated write failure".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();
        let existing = tables
            .get_mut(ns.table())
            .and_then(|rows| rows.iter_mut().find(|r| r.guid == row.guid))
            .ok_or_else(|| {
                LedgerError::Persist(format!("row {} missing from {}", row.guid, ns))
            })?;
        existing.balance = row.balance.clone();
        existing.lock_balance = row.lock_balance.clone();
        existing.timestamp = row.timestamp;
        Ok(())
    }
}
