//! Per-tenant write serialization
//!
//! Balance updates are read-modify-write sequences; two of them racing on
//! the same tenant would lose an update. Each tenant gets one async mutex,
//! different tenants never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::namespace::TenantNamespace;

#[derive(Default)]
pub struct TenantLocks {
    locks: DashMap<TenantNamespace, Arc<Mutex<()>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a tenant's balance table
    pub async fn acquire(&self, ns: &TenantNamespace) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is not held across the await
        let lock = self
            .locks
            .entry(ns.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn tenant_count(&self) -> usize {
        self.locks.len()
    }
}
