use num_bigint::BigUint;
use thiserror::Error;

/// Ledger error types
///
/// A missing row is not an error: queries return `Ok(None)`.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger persist failure: {0}")]
    Persist(String),

    #[error("Balance for {address}/{token_address} would go negative ({balance} - {delta})")]
    NegativeBalance {
        address: String,
        token_address: String,
        balance: BigUint,
        delta: BigUint,
    },

    #[error("Invalid tenant namespace: {0}")]
    InvalidTenant(String),

    #[error("Corrupt balance row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Persist(e.to_string())
    }
}
