//! Tenant-scoped balance queries and bulk updates

use std::sync::Arc;

use num_bigint::BigUint;
use tracing::{debug, info, warn};

use super::error::LedgerError;
use super::locks::TenantLocks;
use super::models::{AddressType, Balance, normalize_address};
use super::namespace::TenantNamespace;
use super::store::BalanceStore;

/// Balance ledger over a pluggable store
///
/// Writes go through the tenant lock shared with the
/// [`Reconciler`](super::Reconciler).
pub struct BalanceLedger {
    store: Arc<dyn BalanceStore>,
    locks: Arc<TenantLocks>,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self {
            store,
            locks: Arc::new(TenantLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BalanceStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<TenantLocks> {
        &self.locks
    }

    pub async fn query_balance(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        self.store
            .query_balance(
                ns,
                &normalize_address(address),
                &normalize_address(token_address),
            )
            .await
    }

    /// Used for destination lookups, e.g. withdrawal target validation
    pub async fn query_balance_by_address(
        &self,
        ns: &TenantNamespace,
        address: &str,
    ) -> Result<Option<Balance>, LedgerError> {
        self.store
            .query_balance_by_address(ns, &normalize_address(address))
            .await
    }

    pub async fn list_hot_wallet_balances(
        &self,
        ns: &TenantNamespace,
        min_balance: &BigUint,
    ) -> Result<Vec<Balance>, LedgerError> {
        self.store
            .list_balances(ns, Some(AddressType::Hot), min_balance)
            .await
    }

    /// Sweep candidates: every row holding at least `min_balance`
    pub async fn list_uncollected(
        &self,
        ns: &TenantNamespace,
        min_balance: &BigUint,
    ) -> Result<Vec<Balance>, LedgerError> {
        self.store.list_balances(ns, None, min_balance).await
    }

    /// Bulk insert, all or nothing
    pub async fn store_balances(
        &self,
        ns: &TenantNamespace,
        mut rows: Vec<Balance>,
    ) -> Result<(), LedgerError> {
        if rows.is_empty() {
            return Ok(());
        }
        for row in &mut rows {
            row.address = normalize_address(&row.address);
            row.token_address = normalize_address(&row.token_address);
        }

        let _guard = self.locks.acquire(ns).await;
        self.store.insert_balances(ns, &rows).await?;
        info!(tenant = %ns, count = rows.len(), "Stored balances");
        Ok(())
    }

    /// Stage or reverse locks on existing rows
    ///
    /// With `is_collection` the whole balance moves into `lock_balance`
    /// (funds are being swept out). Otherwise the input row's
    /// `lock_balance` is subtracted from the balance and becomes the new
    /// lock. Rows that do not exist are skipped. Returns the number of rows
    /// written.
    ///
    /// Every row is checked before the first write, so a `NegativeBalance`
    /// leaves the table untouched. A store failure during the write phase
    /// can still leave earlier rows written.
    pub async fn update_balances(
        &self,
        ns: &TenantNamespace,
        rows: &[Balance],
        is_collection: bool,
    ) -> Result<usize, LedgerError> {
        let _guard = self.locks.acquire(ns).await;
        let mut staged: Vec<Balance> = Vec::with_capacity(rows.len());

        for input in rows {
            let address = normalize_address(&input.address);
            let token_address = normalize_address(&input.token_address);

            // Repeated pairs build on the already staged row
            let idx = match staged
                .iter()
                .position(|row| row.is_pair(&address, &token_address))
            {
                Some(idx) => idx,
                None => {
                    let Some(existing) = self
                        .store
                        .query_balance(ns, &address, &token_address)
                        .await?
                    else {
                        warn!(
                            tenant = %ns,
                            address = %address,
                            token = %token_address,
                            "Balance row not found, skipping update"
                        );
                        continue;
                    };
                    staged.push(existing);
                    staged.len() - 1
                }
            };
            let existing = &mut staged[idx];

            if is_collection {
                existing.lock_balance = std::mem::take(&mut existing.balance);
            } else {
                if existing.balance < input.lock_balance {
                    return Err(LedgerError::NegativeBalance {
                        address,
                        token_address,
                        balance: existing.balance.clone(),
                        delta: input.lock_balance.clone(),
                    });
                }
                existing.balance -= &input.lock_balance;
                existing.lock_balance = input.lock_balance.clone();
            }
        }

        for row in &staged {
            self.store.save_balance(ns, row).await?;
            debug!(
                tenant = %ns,
                address = %row.address,
                balance = %row.balance,
                lock_balance = %row.lock_balance,
                "Balance updated"
            );
        }

        Ok(staged.len())
    }
}
