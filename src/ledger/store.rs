//! Storage seam for tenant balance tables
//!
//! Implementations receive already-normalized (lowercase) addresses.

use async_trait::async_trait;
use num_bigint::BigUint;

use super::error::LedgerError;
use super::models::{AddressType, Balance};
use super::namespace::TenantNamespace;

#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Row for `(address, token_address)` regardless of role
    async fn query_balance(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
    ) -> Result<Option<Balance>, LedgerError>;

    /// Row for `(address, token_address)` with the given role
    async fn query_balance_by_role(
        &self,
        ns: &TenantNamespace,
        address: &str,
        token_address: &str,
        address_type: AddressType,
    ) -> Result<Option<Balance>, LedgerError>;

    /// One row for `address`, wallet roles first so the address's role
    /// is never masked by a stray user row
    async fn query_balance_by_address(
        &self,
        ns: &TenantNamespace,
        address: &str,
    ) -> Result<Option<Balance>, LedgerError>;

    /// Rows with `balance >= min_balance`, optionally restricted to one role
    async fn list_balances(
        &self,
        ns: &TenantNamespace,
        address_type: Option<AddressType>,
        min_balance: &BigUint,
    ) -> Result<Vec<Balance>, LedgerError>;

    /// Insert all rows or none
    async fn insert_balances(
        &self,
        ns: &TenantNamespace,
        rows: &[Balance],
    ) -> Result<(), LedgerError>;

    /// Write back `balance` / `lock_balance` of an existing row (by guid)
    async fn save_balance(&self, ns: &TenantNamespace, row: &Balance) -> Result<(), LedgerError>;
}
