//! Transaction classification
//!
//! Turns a raw chain transaction into the balance delta a tenant should
//! apply, based on which of the tenant's addresses are involved.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::chain::ChainTransaction;
use crate::ledger::{AddressType, BalanceLedger, LedgerError, TenantNamespace, TokenBalance, TxType};

#[async_trait]
pub trait DeltaClassifier: Send + Sync {
    /// Delta for `tx` in the tenant's ledger, `None` when the tenant is
    /// not involved
    async fn classify(
        &self,
        ns: &TenantNamespace,
        tx: &ChainTransaction,
    ) -> Result<Option<TokenBalance>, LedgerError>;
}

/// Tx type implied by the roles of sender and receiver
///
/// `None` for an address the tenant does not know.
pub fn tx_type_for_roles(from: Option<AddressType>, to: Option<AddressType>) -> Option<TxType> {
    use AddressType::{Cold, Hot, User};

    match (from, to) {
        (Some(Hot), Some(Cold)) => Some(TxType::HotToCold),
        (Some(Cold), Some(Hot)) => Some(TxType::ColdToHot),
        (Some(User), Some(Hot)) => Some(TxType::Collection),
        (Some(Hot), _) => Some(TxType::Withdraw),
        (None | Some(User), Some(User)) => Some(TxType::Deposit),
        _ => None,
    }
}

/// Classifies by looking up the role of both ends in the tenant's table
pub struct RoleClassifier {
    ledger: Arc<BalanceLedger>,
}

impl RoleClassifier {
    pub fn new(ledger: Arc<BalanceLedger>) -> Self {
        Self { ledger }
    }

    async fn role(
        &self,
        ns: &TenantNamespace,
        address: &str,
    ) -> Result<Option<AddressType>, LedgerError> {
        if address.is_empty() {
            return Ok(None);
        }
        Ok(self
            .ledger
            .query_balance_by_address(ns, address)
            .await?
            .map(|row| row.address_type))
    }
}

#[async_trait]
impl DeltaClassifier for RoleClassifier {
    async fn classify(
        &self,
        ns: &TenantNamespace,
        tx: &ChainTransaction,
    ) -> Result<Option<TokenBalance>, LedgerError> {
        let from_role = self.role(ns, &tx.from).await?;
        let to_role = self.role(ns, &tx.to).await?;

        let Some(tx_type) = tx_type_for_roles(from_role, to_role) else {
            return Ok(None);
        };
        trace!(tenant = %ns, hash = %tx.hash, %tx_type, "Classified transaction");

        let amount = tx.amount.clone();
        let delta = match tx_type {
            TxType::Deposit => TokenBalance::new(&tx.to, &tx.token_address, tx_type, amount),
            TxType::Collection | TxType::HotToCold | TxType::Withdraw => {
                TokenBalance::new(&tx.from, &tx.token_address, tx_type, amount)
                    .with_counterparty(&tx.to)
            }
            TxType::ColdToHot => TokenBalance::new(&tx.to, &tx.token_address, tx_type, amount)
                .with_counterparty(&tx.from),
        };
        Ok(Some(delta))
    }
}
