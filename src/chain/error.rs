use std::time::Duration;

use num_bigint::BigUint;
use thiserror::Error;

/// Failures talking to the chain account service
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("RPC connection failed: {0}")]
    Transport(String),

    #[error("RPC call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Chain account service error: {0}")]
    Rpc(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Header not found at height {0}")]
    HeaderMissing(BigUint),
}

/// Traversal cursor failures
#[derive(Debug, Error)]
pub enum CursorError {
    /// Transient; retry on the next poll
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(#[from] GatewayError),

    /// The provider is not synced yet
    #[error("Latest header unreported")]
    NoHeaderReported,

    /// The chain regressed below what was already traversed. The cursor
    /// must be reset from a trusted checkpoint; retrying will not help.
    #[error(
        "Cursor is ahead of the provider: last traversed {last_traversed}, confirmed tip {confirmed_tip}"
    )]
    CursorAheadOfProvider {
        last_traversed: BigUint,
        confirmed_tip: BigUint,
    },
}

impl CursorError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CursorError::CursorAheadOfProvider { .. })
    }
}
