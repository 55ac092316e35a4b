//! multichain_sync - Multichain wallet balance synchronizer
//!
//! Follows several chains through a chain account service and keeps a
//! per-tenant balance ledger in step with confirmed on-chain transfers.
//!
//! # Modules
//!
//! - [`chain`] - RPC transport, typed gateway and traversal cursor
//! - [`ledger`] - Per-tenant balance tables and the reconciliation engine
//! - [`business`] - Tenant registry
//! - [`sync`] - Per-chain polling loop and transaction classification
//! - [`notifier`] - Tenant webhooks
//! - [`cache`] - Bounded public key -> address cache

pub mod business;
pub mod cache;
pub mod chain;
pub mod ledger;
pub mod notifier;
pub mod sync;

// Runtime plumbing
pub mod config;
pub mod db;
pub mod logging;

pub use cache::AddressCache;
pub use chain::{BlockHeader, ChainGateway, TraversalCursor};
pub use ledger::{Balance, BalanceLedger, Reconciler, TenantNamespace, TokenBalance};
