//! Chain synchronization
//!
//! One [`ChainSyncer`] per configured chain drives a
//! [`TraversalCursor`](crate::chain::TraversalCursor), classifies block
//! transactions per tenant and reconciles them into the ledger.

pub mod classifier;
pub mod error;
pub mod worker;

pub use classifier::{DeltaClassifier, RoleClassifier, tx_type_for_roles};
pub use error::SyncError;
pub use worker::{ChainSyncer, PollReport, SyncSettings};
