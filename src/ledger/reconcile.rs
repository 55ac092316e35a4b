//! Reconciliation Engine
//!
//! Applies classified on-chain deltas to a tenant's balance table:
//!
//! | tx type    | effect                                                   |
//! |------------|----------------------------------------------------------|
//! | deposit    | user `balance += delta`                                  |
//! | withdraw   | matching hot wallets `lock_balance = 0`                  |
//! | collection | user `lock_balance = 0`, matching hot wallets `+= delta` |
//! | hot→cold   | every hot wallet `lock_balance = 0`                      |
//! | cold→hot   | every hot wallet `balance += delta`                      |
//!
//! A deposit whose `(address, token)` pair has never been seen creates a
//! new user row seeded from the delta, unless the address is one of the
//! tenant's wallets. Other first-seen pairs never create rows. Each delta is handled independently:
//! an unknown pair or a failed lookup never drops the rest of the batch.

use std::sync::Arc;

use num_bigint::BigUint;
use tracing::{debug, error, info, warn};

use super::error::LedgerError;
use super::locks::TenantLocks;
use super::models::{AddressType, Balance, TokenBalance, TxType};
use super::namespace::TenantNamespace;
use super::service::BalanceLedger;
use super::store::BalanceStore;

/// Outcome counters for one reconciled batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// New user rows created from first-seen deposits
    pub created: usize,
    /// Deltas dispatched on their tx type
    pub applied: usize,
    /// Deltas dropped after a lookup failure or a role mismatch
    pub skipped: usize,
}

enum Outcome {
    Created,
    Applied,
    Skipped,
}

pub struct Reconciler {
    store: Arc<dyn BalanceStore>,
    locks: Arc<TenantLocks>,
}

impl Reconciler {
    /// Share the ledger's store and tenant locks
    pub fn new(ledger: &BalanceLedger) -> Self {
        Self {
            store: ledger.store().clone(),
            locks: ledger.locks().clone(),
        }
    }

    /// Apply `deltas` to the tenant's table, in order
    ///
    /// Holds the tenant lock for the whole batch. A persist failure aborts
    /// the remainder of the batch and is returned; deltas already written
    /// stay written.
    pub async fn reconcile(
        &self,
        ns: &TenantNamespace,
        deltas: &[TokenBalance],
    ) -> Result<ReconcileReport, LedgerError> {
        let _guard = self.locks.acquire(ns).await;

        let mut hot_wallets = self
            .store
            .list_balances(ns, Some(AddressType::Hot), &BigUint::ZERO)
            .await
            .inspect_err(|e| error!(tenant = %ns, "Query hot wallet balances failed: {}", e))?;

        let mut report = ReconcileReport::default();

        for delta in deltas.iter().map(TokenBalance::normalized) {
            let user = match self
                .store
                .query_balance_by_role(
                    ns,
                    &delta.address,
                    &delta.token_address,
                    AddressType::User,
                )
                .await
            {
                Ok(user) => user,
                Err(e) => {
                    error!(tenant = %ns, address = %delta.address, "Load user balance failed: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            let outcome = match user {
                Some(mut user) => {
                    self.dispatch(ns, &delta, Some(&mut user), &mut hot_wallets)
                        .await?
                }
                None => match self
                    .store
                    .query_balance(ns, &delta.address, &delta.token_address)
                    .await
                {
                    // The pair belongs to one of the exchange's own wallets
                    Ok(Some(wallet)) => {
                        debug!(
                            tenant = %ns,
                            address = %wallet.address,
                            role = %wallet.address_type,
                            "Delta addressed to a wallet row"
                        );
                        self.dispatch(ns, &delta, None, &mut hot_wallets).await?
                    }
                    Ok(None) => self.unknown_pair(ns, &delta, &mut hot_wallets).await?,
                    Err(e) => {
                        error!(tenant = %ns, address = %delta.address, "Load balance failed: {}", e);
                        Outcome::Skipped
                    }
                },
            };

            match outcome {
                Outcome::Created => report.created += 1,
                Outcome::Applied => report.applied += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }

        info!(
            tenant = %ns,
            created = report.created,
            applied = report.applied,
            skipped = report.skipped,
            "Reconciled balance batch"
        );
        Ok(report)
    }

    /// No row for the delta's pair. A known wallet moving a token it holds
    /// no row for is dispatched as a wallet; only a deposit to a non-wallet
    /// address seeds a new user row.
    async fn unknown_pair(
        &self,
        ns: &TenantNamespace,
        delta: &TokenBalance,
        hot_wallets: &mut [Balance],
    ) -> Result<Outcome, LedgerError> {
        let owner = match self.store.query_balance_by_address(ns, &delta.address).await {
            Ok(owner) => owner,
            Err(e) => {
                error!(tenant = %ns, address = %delta.address, "Load address role failed: {}", e);
                return Ok(Outcome::Skipped);
            }
        };

        if let Some(wallet) = owner.filter(|row| row.address_type.is_wallet()) {
            debug!(
                tenant = %ns,
                address = %wallet.address,
                role = %wallet.address_type,
                token = %delta.token_address,
                "Wallet has no row for token"
            );
            return self.dispatch(ns, delta, None, hot_wallets).await;
        }

        if delta.tx_type != TxType::Deposit {
            warn!(
                tenant = %ns,
                address = %delta.address,
                tx_type = %delta.tx_type,
                "No balance row for non-deposit delta, skipped"
            );
            return Ok(Outcome::Skipped);
        }

        self.create_row(ns, delta).await?;
        Ok(Outcome::Created)
    }

    async fn create_row(&self, ns: &TenantNamespace, delta: &TokenBalance) -> Result<(), LedgerError> {
        let row = Balance::from_delta(delta);
        self.store
            .insert_balances(ns, std::slice::from_ref(&row))
            .await
            .inspect_err(|e| error!(tenant = %ns, address = %row.address, "Create balance row failed: {}", e))?;
        info!(
            tenant = %ns,
            address = %row.address,
            token = %row.token_address,
            balance = %row.balance,
            "Created balance row"
        );
        Ok(())
    }

    async fn dispatch(
        &self,
        ns: &TenantNamespace,
        delta: &TokenBalance,
        user: Option<&mut Balance>,
        hot_wallets: &mut [Balance],
    ) -> Result<Outcome, LedgerError> {
        info!(tenant = %ns, tx_type = %delta.tx_type, address = %delta.address, "Handle balance update");

        match delta.tx_type {
            TxType::Deposit => {
                let Some(user) = user else {
                    warn!(tenant = %ns, address = %delta.address, "Deposit to a wallet address ignored");
                    return Ok(Outcome::Skipped);
                };
                user.balance += &delta.balance;
                self.store.save_balance(ns, user).await?;
                debug!(
                    tenant = %ns,
                    amount = %delta.balance,
                    after = %user.balance,
                    "Deposit balance update"
                );
            }
            TxType::Withdraw => {
                for hot in hot_wallets.iter_mut().filter(|h| delta.touches(h)) {
                    hot.lock_balance = BigUint::ZERO;
                    self.store.save_balance(ns, hot).await?;
                }
            }
            TxType::Collection => {
                let Some(user) = user else {
                    warn!(tenant = %ns, address = %delta.address, "Collection from a wallet address ignored");
                    return Ok(Outcome::Skipped);
                };
                for hot in hot_wallets.iter_mut().filter(|h| delta.touches(h)) {
                    user.lock_balance = BigUint::ZERO;
                    self.store.save_balance(ns, user).await?;
                    hot.balance += &delta.balance;
                    self.store.save_balance(ns, hot).await?;
                }
            }
            // Rebalancing deltas apply to every hot wallet of the tenant
            TxType::HotToCold => {
                for hot in hot_wallets.iter_mut() {
                    hot.lock_balance = BigUint::ZERO;
                    self.store.save_balance(ns, hot).await?;
                }
            }
            TxType::ColdToHot => {
                for hot in hot_wallets.iter_mut() {
                    hot.balance += &delta.balance;
                    self.store.save_balance(ns, hot).await?;
                }
            }
        }

        Ok(Outcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryBalanceStore;

    const USDT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
    const HOT: &str = "0x00000000000000000000000000000000000000aa";
    const COLD: &str = "0x00000000000000000000000000000000000000cc";
    const USER: &str = "0x00000000000000000000000000000000000000u1";

    struct Harness {
        ledger: Arc<BalanceLedger>,
        reconciler: Arc<Reconciler>,
        store: Arc<MemoryBalanceStore>,
        ns: TenantNamespace,
    }

    impl Harness {
        async fn new(rows: Vec<Balance>) -> Self {
            let store = Arc::new(MemoryBalanceStore::new());
            let ledger = Arc::new(BalanceLedger::new(store.clone()));
            let reconciler = Arc::new(Reconciler::new(&ledger));
            let ns = TenantNamespace::new("acme").unwrap();
            ledger.store_balances(&ns, rows).await.unwrap();
            Self {
                ledger,
                reconciler,
                store,
                ns,
            }
        }

        async fn row(&self, address: &str) -> Balance {
            self.ledger
                .query_balance(&self.ns, address, USDT)
                .await
                .unwrap()
                .expect("row exists")
        }
    }

    fn amount(v: u64) -> BigUint {
        BigUint::from(v)
    }

    #[tokio::test]
    async fn test_deposit_adds_to_user_balance() {
        let h = Harness::new(vec![
            Balance::new(USER, USDT, AddressType::User)
                .with_balance(50u32)
                .with_lock_balance(7u32),
        ])
        .await;

        let delta = TokenBalance::new(USER, USDT, TxType::Deposit, 100u32);
        let report = h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        assert_eq!(report.applied, 1);
        let user = h.row(USER).await;
        assert_eq!(user.balance, amount(150));
        assert_eq!(user.lock_balance, amount(7));
    }

    #[tokio::test]
    async fn test_collection_credits_hot_wallet_and_clears_user_lock() {
        let h = Harness::new(vec![
            Balance::new(USER, USDT, AddressType::User).with_balance(200u32),
            Balance::new(HOT, USDT, AddressType::Hot),
        ])
        .await;

        let delta =
            TokenBalance::new(USER, USDT, TxType::Collection, 200u32).with_counterparty(HOT);
        h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        let user = h.row(USER).await;
        assert_eq!(user.lock_balance, BigUint::ZERO);
        assert_eq!(h.row(HOT).await.balance, amount(200));
    }

    #[tokio::test]
    async fn test_collection_clears_staged_lock() {
        let h = Harness::new(vec![
            Balance::new(USER, USDT, AddressType::User).with_lock_balance(80u32),
            Balance::new(HOT, USDT, AddressType::Hot).with_balance(20u32),
        ])
        .await;

        let delta =
            TokenBalance::new(USER, USDT, TxType::Collection, 80u32).with_counterparty(HOT);
        h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        assert_eq!(h.row(USER).await.lock_balance, BigUint::ZERO);
        assert_eq!(h.row(HOT).await.balance, amount(100));
    }

    #[tokio::test]
    async fn test_withdraw_releases_hot_wallet_lock() {
        let h = Harness::new(vec![
            Balance::new(USER, USDT, AddressType::User).with_balance(1u32),
            Balance::new(HOT, USDT, AddressType::Hot)
                .with_balance(500u32)
                .with_lock_balance(120u32),
        ])
        .await;

        let delta = TokenBalance::new(USER, USDT, TxType::Withdraw, 120u32).with_counterparty(HOT);
        h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        let hot = h.row(HOT).await;
        assert_eq!(hot.lock_balance, BigUint::ZERO);
        assert_eq!(hot.balance, amount(500));
    }

    #[tokio::test]
    async fn test_withdraw_addressed_to_hot_wallet_row() {
        let h = Harness::new(vec![
            Balance::new(HOT, USDT, AddressType::Hot)
                .with_balance(500u32)
                .with_lock_balance(120u32),
        ])
        .await;

        let delta = TokenBalance::new(HOT, USDT, TxType::Withdraw, 120u32);
        let report = h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.applied, 1);
        assert_eq!(h.row(HOT).await.lock_balance, BigUint::ZERO);
        assert_eq!(h.store.rows(&h.ns).len(), 1);
    }

    #[tokio::test]
    async fn test_hot_to_cold_clears_every_hot_lock() {
        let other_token = "0x6b175474e89094c44da98b954eedeac495271d0f";
        let h = Harness::new(vec![
            Balance::new(USER, USDT, AddressType::User),
            Balance::new(HOT, USDT, AddressType::Hot).with_lock_balance(10u32),
            Balance::new(HOT, other_token, AddressType::Hot).with_lock_balance(20u32),
        ])
        .await;

        let delta = TokenBalance::new(USER, USDT, TxType::HotToCold, 10u32).with_counterparty(COLD);
        h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        for row in h.store.rows(&h.ns) {
            if row.address_type == AddressType::Hot {
                assert_eq!(row.lock_balance, BigUint::ZERO);
            }
        }
    }

    #[tokio::test]
    async fn test_cold_to_hot_accumulates_within_batch() {
        let h = Harness::new(vec![
            Balance::new(USER, USDT, AddressType::User),
            Balance::new(HOT, USDT, AddressType::Hot).with_balance(5u32),
        ])
        .await;

        let deltas = [
            TokenBalance::new(USER, USDT, TxType::ColdToHot, 10u32),
            TokenBalance::new(USER, USDT, TxType::ColdToHot, 20u32),
        ];
        h.reconciler.reconcile(&h.ns, &deltas).await.unwrap();

        assert_eq!(h.row(HOT).await.balance, amount(35));
    }

    #[tokio::test]
    async fn test_unknown_pair_creates_row_and_batch_continues() {
        let h = Harness::new(vec![Balance::new(USER, USDT, AddressType::User).with_balance(1u32)]).await;

        let newcomer = "0x00000000000000000000000000000000000000N2";
        let deltas = [
            TokenBalance::new(newcomer, USDT, TxType::Deposit, 40u32).with_lock_balance(3u32),
            TokenBalance::new(USER, USDT, TxType::Deposit, 9u32),
        ];
        let report = h.reconciler.reconcile(&h.ns, &deltas).await.unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.applied, 1);

        let created = h.row(newcomer).await;
        assert_eq!(created.address, newcomer.to_lowercase());
        assert_eq!(created.balance, amount(40));
        assert_eq!(created.lock_balance, amount(3));
        assert_eq!(created.address_type, AddressType::User);

        assert_eq!(h.row(USER).await.balance, amount(10));
    }

    #[tokio::test]
    async fn test_hot_wallet_withdrawing_unheld_token_creates_no_row() {
        let dai = "0x6b175474e89094c44da98b954eedeac495271d0f";
        let external = "0x00000000000000000000000000000000000000ee";
        let h = Harness::new(vec![
            Balance::new(HOT, USDT, AddressType::Hot).with_balance(1000u32),
        ])
        .await;

        let delta = TokenBalance::new(HOT, dai, TxType::Withdraw, 500u32).with_counterparty(external);
        let report = h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.applied, 1);
        assert_eq!(h.store.rows(&h.ns).len(), 1);
        assert!(h.ledger.query_balance(&h.ns, HOT, dai).await.unwrap().is_none());
        assert_eq!(h.row(HOT).await.balance, amount(1000));

        let role = h.ledger.query_balance_by_address(&h.ns, HOT).await.unwrap().unwrap();
        assert_eq!(role.address_type, AddressType::Hot);
    }

    #[tokio::test]
    async fn test_deposit_to_wallet_for_unheld_token_creates_no_row() {
        let dai = "0x6b175474e89094c44da98b954eedeac495271d0f";
        let h = Harness::new(vec![Balance::new(COLD, USDT, AddressType::Cold)]).await;

        let delta = TokenBalance::new(COLD, dai, TxType::Deposit, 70u32);
        let report = h.reconciler.reconcile(&h.ns, &[delta]).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(h.store.rows(&h.ns).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_pair_only_created_for_deposits() {
        let h = Harness::new(vec![Balance::new(HOT, USDT, AddressType::Hot)]).await;

        let stranger = "0x00000000000000000000000000000000000000f3";
        let deltas = [
            TokenBalance::new(stranger, USDT, TxType::Withdraw, 5u32).with_counterparty(HOT),
            TokenBalance::new(stranger, USDT, TxType::Collection, 5u32).with_counterparty(HOT),
        ];
        let report = h.reconciler.reconcile(&h.ns, &deltas).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.skipped, 2);
        assert!(h.ledger.query_balance(&h.ns, stranger, USDT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_failure_is_surfaced() {
        let h = Harness::new(vec![Balance::new(USER, USDT, AddressType::User)]).await;
        h.store.set_fail_saves(true);

        let delta = TokenBalance::new(USER, USDT, TxType::Deposit, 1u32);
        let err = h.reconciler.reconcile(&h.ns, &[delta]).await;
        assert!(matches!(err, Err(LedgerError::Persist(_))));
    }

    #[tokio::test]
    async fn test_concurrent_deposits_do_not_lose_updates() {
        let h = Harness::new(vec![Balance::new(USER, USDT, AddressType::User)]).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let reconciler = h.reconciler.clone();
            let ns = h.ns.clone();
            handles.push(tokio::spawn(async move {
                let delta = TokenBalance::new(USER, USDT, TxType::Deposit, 25u32);
                reconciler.reconcile(&ns, &[delta]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(h.row(USER).await.balance, amount(400));
    }
}
