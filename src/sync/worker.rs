//! Chain Syncer - per-chain polling loop
//!
//! Each tick pulls the next batch of confirmed headers from the cursor,
//! fetches their transactions, classifies them for every registered
//! tenant and reconciles the resulting deltas. Tenants are processed
//! concurrently; the tenant lock in the ledger serializes writers of the
//! same tenant.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use num_bigint::BigUint;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::classifier::DeltaClassifier;
use super::error::SyncError;
use crate::business::{Business, BusinessStore, NotifyKind};
use crate::chain::{
    BlockHeader, ChainGateway, ChainTransaction, CursorError, GatewayError, HeaderQuery,
    TraversalCursor,
};
use crate::ledger::{BalanceLedger, Reconciler, TxType};
use crate::notifier::{NotifyRequest, NotifyTransaction, Notifier};

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub max_batch_size: u64,
    /// Consecutive ahead-of-provider polls before the alert escalates
    pub ahead_alert_threshold: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_batch_size: 100,
            ahead_alert_threshold: 3,
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub headers: usize,
    pub transactions: usize,
    pub tenants: usize,
    /// Deltas applied or rows created, summed over tenants
    pub applied: usize,
    pub failed_tenants: usize,
}

fn notify_kind(tx_type: TxType) -> NotifyKind {
    match tx_type {
        TxType::Deposit => NotifyKind::Deposit,
        TxType::Withdraw => NotifyKind::Withdraw,
        TxType::Collection | TxType::HotToCold | TxType::ColdToHot => NotifyKind::TxFlow,
    }
}

pub struct ChainSyncer {
    gateway: Arc<ChainGateway>,
    cursor: TraversalCursor,
    registry: Arc<dyn BusinessStore>,
    reconciler: Reconciler,
    classifier: Arc<dyn DeltaClassifier>,
    notifier: Option<Notifier>,
    settings: SyncSettings,
    ahead_streak: u32,
}

impl ChainSyncer {
    pub fn new(
        gateway: Arc<ChainGateway>,
        cursor: TraversalCursor,
        registry: Arc<dyn BusinessStore>,
        ledger: &BalanceLedger,
        classifier: Arc<dyn DeltaClassifier>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            gateway,
            cursor,
            registry,
            reconciler: Reconciler::new(ledger),
            classifier,
            notifier: None,
            settings,
            ahead_streak: 0,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn cursor(&self) -> &TraversalCursor {
        &self.cursor
    }

    pub fn ahead_streak(&self) -> u32 {
        self.ahead_streak
    }

    /// Header to resume after, for a configured start height
    pub async fn resume_header(
        gateway: &ChainGateway,
        start_height: Option<u64>,
    ) -> Result<Option<BlockHeader>, SyncError> {
        let Some(height) = start_height else {
            return Ok(None);
        };
        let height = BigUint::from(height);
        let header = gateway
            .header(HeaderQuery::Height(height.clone()))
            .await?
            .ok_or(GatewayError::HeaderMissing(height))?;
        Ok(Some(header))
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            chain = self.gateway.chain(),
            interval = ?self.settings.poll_interval,
            batch = self.settings.max_batch_size,
            "Chain syncer starting"
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Ok(report) = self.poll_once().await
                        && report.headers > 0
                    {
                        info!(
                            chain = self.gateway.chain(),
                            headers = report.headers,
                            transactions = report.transactions,
                            applied = report.applied,
                            failed_tenants = report.failed_tenants,
                            "Synced batch"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(chain = self.gateway.chain(), "Chain syncer stopped");
    }

    /// One tick of the loop
    ///
    /// If fetching the batch's transactions or the tenant list fails the
    /// cursor is rewound, so the same headers are retried next tick.
    pub async fn poll_once(&mut self) -> Result<PollReport, SyncError> {
        let checkpoint = self.cursor.last_traversed_header().cloned();

        let headers = match self.cursor.next_headers(self.settings.max_batch_size).await {
            Ok(headers) => {
                self.ahead_streak = 0;
                headers
            }
            Err(e) => {
                self.on_cursor_error(&e);
                return Err(e.into());
            }
        };
        if headers.is_empty() {
            return Ok(PollReport::default());
        }

        match self.process(&headers).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(chain = self.gateway.chain(), "Batch failed: {}", e);
                self.cursor.reset(checkpoint);
                Err(e)
            }
        }
    }

    fn on_cursor_error(&mut self, err: &CursorError) {
        let chain = self.gateway.chain();
        match err {
            CursorError::CursorAheadOfProvider { .. } => {
                self.ahead_streak += 1;
                if self.ahead_streak >= self.settings.ahead_alert_threshold {
                    error!(chain, streak = self.ahead_streak, "Chain regressed, reset the cursor from a trusted checkpoint: {}", err);
                } else {
                    warn!(chain, streak = self.ahead_streak, "{}", err);
                }
            }
            CursorError::NoHeaderReported => debug!(chain, "Provider reports no head yet"),
            CursorError::ProviderUnavailable(e) => warn!(chain, "Provider unavailable: {}", e),
        }
    }

    async fn process(&self, headers: &[BlockHeader]) -> Result<PollReport, SyncError> {
        let mut batch: Vec<(String, ChainTransaction)> = Vec::new();
        for header in headers {
            let txs = self.gateway.block_transactions(&header.number).await?;
            batch.extend(txs.into_iter().map(|tx| (header.hash.clone(), tx)));
        }

        let mut report = PollReport {
            headers: headers.len(),
            transactions: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }

        let tenants = self.registry.query_business_list().await?;
        report.tenants = tenants.len();

        let results = join_all(tenants.iter().map(|b| self.sync_tenant(b, &batch))).await;
        for result in results {
            match result {
                Ok(applied) => report.applied += applied,
                Err(_) => report.failed_tenants += 1,
            }
        }
        Ok(report)
    }

    async fn sync_tenant(
        &self,
        business: &Business,
        batch: &[(String, ChainTransaction)],
    ) -> Result<usize, SyncError> {
        let ns = business
            .namespace()
            .inspect_err(|e| warn!(business = %business.business_uid, "Skipping tenant: {}", e))?;
        let confirms = u8::try_from(self.cursor.confirmation_depth()).unwrap_or(u8::MAX);

        let mut deltas = Vec::new();
        let mut notices: BTreeMap<NotifyKind, Vec<NotifyTransaction>> = BTreeMap::new();
        for (block_hash, tx) in batch {
            match self.classifier.classify(&ns, tx).await {
                Ok(Some(delta)) => {
                    notices
                        .entry(notify_kind(delta.tx_type))
                        .or_default()
                        .push(NotifyTransaction::from_chain(tx, block_hash, delta.tx_type, confirms));
                    deltas.push(delta);
                }
                Ok(None) => {}
                Err(e) => warn!(tenant = %ns, hash = %tx.hash, "Classify transaction failed: {}", e),
            }
        }
        if deltas.is_empty() {
            return Ok(0);
        }

        let report = self
            .reconciler
            .reconcile(&ns, &deltas)
            .await
            .inspect_err(|e| error!(tenant = %ns, "Reconcile failed: {}", e))?;

        self.notify(business, notices).await;
        Ok(report.applied + report.created)
    }

    async fn notify(
        &self,
        business: &Business,
        notices: BTreeMap<NotifyKind, Vec<NotifyTransaction>>,
    ) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for (kind, transactions) in notices {
            let Some(url) = business.notify_url(kind) else {
                continue;
            };
            let req = NotifyRequest { transactions };
            if let Err(e) = notifier.notify(url, &req).await {
                warn!(business = %business.business_uid, ?kind, url, "Notify failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AddressCache;
    use crate::chain::DEFAULT_NETWORK;
    use crate::chain::rpc::RpcTransaction;
    use crate::chain::rpc::mock::MockChainAccount;
    use crate::business::MemoryBusinessStore;
    use crate::ledger::{AddressType, Balance, MemoryBalanceStore, TenantNamespace};
    use crate::sync::classifier::RoleClassifier;

    const ETH: &str = "0x0000000000000000000000000000000000000000";

    struct Harness {
        mock: Arc<MockChainAccount>,
        store: Arc<MemoryBalanceStore>,
        syncer: ChainSyncer,
    }

    fn ns(uid: &str) -> TenantNamespace {
        TenantNamespace::new(uid).unwrap()
    }

    fn transfer(hash: &str, from: &str, to: &str, amount: &str) -> RpcTransaction {
        RpcTransaction {
            hash: hash.to_string(),
            height: String::new(),
            from: from.to_string(),
            to: to.to_string(),
            token_address: ETH.to_string(),
            amount: amount.to_string(),
            fee: "21000".to_string(),
        }
    }

    fn row(store: &MemoryBalanceStore, uid: &str, address: &str) -> Balance {
        store
            .rows(&ns(uid))
            .into_iter()
            .find(|r| r.address == address)
            .unwrap()
    }

    async fn harness(head: u64, depth: u64) -> Harness {
        let mock = Arc::new(MockChainAccount::with_head(head));
        let store = Arc::new(MemoryBalanceStore::new());
        let ledger = Arc::new(BalanceLedger::new(store.clone()));
        let registry = Arc::new(MemoryBusinessStore::new());

        for uid in ["acme", "globex"] {
            registry.store_business(&Business::new(uid)).await.unwrap();
        }
        ledger
            .store_balances(
                &ns("acme"),
                vec![
                    Balance::new("0xu1", ETH, AddressType::User).with_balance(50u32),
                    Balance::new("0xhot", ETH, AddressType::Hot)
                        .with_balance(1000u32)
                        .with_lock_balance(300u32),
                    Balance::new("0xcold", ETH, AddressType::Cold),
                ],
            )
            .await
            .unwrap();
        ledger
            .store_balances(
                &ns("globex"),
                vec![Balance::new("0xg1", ETH, AddressType::User).with_balance(7u32)],
            )
            .await
            .unwrap();

        let gateway = Arc::new(ChainGateway::new(
            mock.clone(),
            "Ethereum",
            DEFAULT_NETWORK,
            Duration::from_secs(1),
            Arc::new(AddressCache::new(8)),
        ));
        let cursor = TraversalCursor::new(gateway.clone(), None, depth);
        let syncer = ChainSyncer::new(
            gateway,
            cursor,
            registry,
            &ledger,
            Arc::new(RoleClassifier::new(ledger.clone())),
            SyncSettings {
                poll_interval: Duration::from_millis(10),
                max_batch_size: 100,
                ahead_alert_threshold: 2,
            },
        );

        Harness {
            mock,
            store,
            syncer,
        }
    }

    #[tokio::test]
    async fn test_deposit_is_credited_to_owning_tenant_only() {
        let mut h = harness(10, 2).await;
        h.mock
            .add_transaction(3, transfer("0xd1", "0xexternal", "0xU1", "100"));

        let report = h.syncer.poll_once().await.unwrap();
        assert_eq!(report.headers, 9);
        assert_eq!(report.transactions, 1);
        assert_eq!(report.tenants, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed_tenants, 0);

        let user = row(&h.store, "acme", "0xu1");
        assert_eq!(user.balance, BigUint::from(150u32));
        assert_eq!(user.lock_balance, BigUint::ZERO);

        let globex = h.store.rows(&ns("globex"));
        assert_eq!(globex.len(), 1);
        assert_eq!(globex[0].balance, BigUint::from(7u32));
    }

    #[tokio::test]
    async fn test_withdraw_and_collection_flow() {
        let mut h = harness(10, 0).await;
        h.mock
            .add_transaction(1, transfer("0xw1", "0xhot", "0xexternal", "300"));
        h.mock.add_transaction(2, transfer("0xc1", "0xu1", "0xhot", "50"));

        h.syncer.poll_once().await.unwrap();

        let hot = row(&h.store, "acme", "0xhot");
        assert_eq!(hot.lock_balance, BigUint::ZERO);
        assert_eq!(hot.balance, BigUint::from(1050u32));
        assert_eq!(row(&h.store, "acme", "0xu1").lock_balance, BigUint::ZERO);
    }

    #[tokio::test]
    async fn test_block_fetch_failure_rewinds_cursor() {
        let mut h = harness(10, 2).await;
        h.mock
            .add_transaction(3, transfer("0xd1", "0xexternal", "0xu1", "100"));
        h.mock.set_fail_block_at(Some(5));

        let err = h.syncer.poll_once().await.unwrap_err();
        assert!(matches!(err, SyncError::Gateway(_)));
        assert!(h.syncer.cursor().last_traversed_header().is_none());
        assert_eq!(row(&h.store, "acme", "0xu1").balance, BigUint::from(50u32));

        h.mock.set_fail_block_at(None);
        h.syncer.poll_once().await.unwrap();
        assert_eq!(row(&h.store, "acme", "0xu1").balance, BigUint::from(150u32));

        // Nothing new at the tip: the deposit is not applied twice
        assert_eq!(h.syncer.poll_once().await.unwrap(), PollReport::default());
        assert_eq!(row(&h.store, "acme", "0xu1").balance, BigUint::from(150u32));
    }

    #[tokio::test]
    async fn test_ahead_of_provider_streak() {
        let mut h = harness(20, 0).await;
        h.syncer.poll_once().await.unwrap();

        h.mock.set_head(Some(5));
        for expected in 1..=3 {
            let err = h.syncer.poll_once().await.unwrap_err();
            assert!(matches!(
                err,
                SyncError::Cursor(CursorError::CursorAheadOfProvider { .. })
            ));
            assert_eq!(h.syncer.ahead_streak(), expected);
        }

        h.mock.set_head(Some(30));
        h.syncer.poll_once().await.unwrap();
        assert_eq!(h.syncer.ahead_streak(), 0);
    }

    #[tokio::test]
    async fn test_resume_header_at_start_height() {
        let h = harness(20, 0).await;
        let gateway = h.syncer.gateway.clone();

        assert!(ChainSyncer::resume_header(&gateway, None).await.unwrap().is_none());
        let header = ChainSyncer::resume_header(&gateway, Some(12))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(header.number, BigUint::from(12u32));
        assert!(ChainSyncer::resume_header(&gateway, Some(99)).await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(10, 0).await;
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(h.syncer.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
