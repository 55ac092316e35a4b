//! Multi-tenant balance ledger
//!
//! Each business owns a `balances_<uid>` table of
//! `(address, token) -> (balance, lock_balance)` rows. The
//! [`BalanceLedger`] exposes queries and bulk updates, the [`Reconciler`]
//! applies classified on-chain deltas to it.

pub mod error;
pub mod locks;
pub mod memory;
pub mod models;
pub mod namespace;
pub mod postgres;
pub mod reconcile;
pub mod service;
pub mod store;

pub use error::LedgerError;
pub use memory::MemoryBalanceStore;
pub use models::{AddressType, Balance, TokenBalance, TxType, normalize_address};
pub use namespace::TenantNamespace;
pub use postgres::PgBalanceStore;
pub use reconcile::{ReconcileReport, Reconciler};
pub use service::BalanceLedger;
pub use store::BalanceStore;
