use thiserror::Error;

use crate::business::BusinessError;
use crate::chain::{CursorError, GatewayError};
use crate::ledger::LedgerError;

/// Failure of one poll cycle of a chain syncer
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Registry error: {0}")]
    Registry(#[from] BusinessError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
