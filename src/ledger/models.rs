//! Balance ledger data model

use std::fmt;

use num_bigint::BigUint;
use uuid::Uuid;

/// Lowercase an address for storage and comparison.
///
/// Addresses arrive in mixed case (EIP-55 checksums, user input); the
/// ledger only ever stores and queries the lowercase form.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Role of an address inside a tenant's wallet system (`address_type` column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressType {
    #[default]
    User = 0,
    Hot = 1,
    Cold = 2,
}

impl AddressType {
    /// Hot and cold wallets are operated by the exchange itself
    pub fn is_wallet(self) -> bool {
        matches!(self, AddressType::Hot | AddressType::Cold)
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::User => write!(f, "user"),
            AddressType::Hot => write!(f, "hot"),
            AddressType::Cold => write!(f, "cold"),
        }
    }
}

impl TryFrom<i16> for AddressType {
    type Error = String;

    fn try_from(val: i16) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(AddressType::User),
            1 => Ok(AddressType::Hot),
            2 => Ok(AddressType::Cold),
            other => Err(format!("Invalid address type: {}", other)),
        }
    }
}

impl From<AddressType> for i16 {
    fn from(val: AddressType) -> i16 {
        val as i16
    }
}

/// Transaction classification driving the reconciliation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Deposit = 0,
    Withdraw = 1,
    Collection = 2,
    HotToCold = 3,
    ColdToHot = 4,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Deposit => write!(f, "deposit"),
            TxType::Withdraw => write!(f, "withdraw"),
            TxType::Collection => write!(f, "collection"),
            TxType::HotToCold => write!(f, "hot2cold"),
            TxType::ColdToHot => write!(f, "cold2hot"),
        }
    }
}

impl TryFrom<u8> for TxType {
    type Error = String;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(TxType::Deposit),
            1 => Ok(TxType::Withdraw),
            2 => Ok(TxType::Collection),
            3 => Ok(TxType::HotToCold),
            4 => Ok(TxType::ColdToHot),
            other => Err(format!("Invalid tx type: {}", other)),
        }
    }
}

impl From<TxType> for u8 {
    fn from(val: TxType) -> u8 {
        val as u8
    }
}

/// One row of a tenant's `balances_<uid>` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub guid: Uuid,
    pub address: String,
    pub token_address: String,
    /// Spendable / custodial funds
    pub balance: BigUint,
    /// Funds earmarked for an in-flight collection or rebalancing
    pub lock_balance: BigUint,
    pub address_type: AddressType,
    pub timestamp: i64,
}

impl Balance {
    /// Create an empty row for `(address, token_address)`
    pub fn new(address: &str, token_address: &str, address_type: AddressType) -> Self {
        Self {
            guid: Uuid::new_v4(),
            address: normalize_address(address),
            token_address: normalize_address(token_address),
            balance: BigUint::ZERO,
            lock_balance: BigUint::ZERO,
            address_type,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_balance(mut self, balance: impl Into<BigUint>) -> Self {
        self.balance = balance.into();
        self
    }

    pub fn with_lock_balance(mut self, lock_balance: impl Into<BigUint>) -> Self {
        self.lock_balance = lock_balance.into();
        self
    }

    /// Seed a fresh user row from the first delta observed for its pair
    pub fn from_delta(delta: &TokenBalance) -> Self {
        Self::new(&delta.address, &delta.token_address, AddressType::User)
            .with_balance(delta.balance.clone())
            .with_lock_balance(delta.lock_balance.clone())
    }

    pub fn is_pair(&self, address: &str, token_address: &str) -> bool {
        self.address == address && self.token_address == token_address
    }
}

/// A classified on-chain balance change for one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub address: String,
    pub token_address: String,
    pub balance: BigUint,
    pub lock_balance: BigUint,
    pub tx_type: TxType,
    /// Wallet on the other side of the transfer (e.g. the hot wallet
    /// receiving a collection)
    pub counterparty: Option<String>,
}

impl TokenBalance {
    pub fn new(
        address: &str,
        token_address: &str,
        tx_type: TxType,
        balance: impl Into<BigUint>,
    ) -> Self {
        Self {
            address: normalize_address(address),
            token_address: normalize_address(token_address),
            balance: balance.into(),
            lock_balance: BigUint::ZERO,
            tx_type,
            counterparty: None,
        }
    }

    pub fn with_lock_balance(mut self, lock_balance: impl Into<BigUint>) -> Self {
        self.lock_balance = lock_balance.into();
        self
    }

    pub fn with_counterparty(mut self, counterparty: &str) -> Self {
        self.counterparty = Some(normalize_address(counterparty));
        self
    }

    /// Lowercased copy; deltas built by struct literal may carry mixed case
    pub fn normalized(&self) -> Self {
        Self {
            address: normalize_address(&self.address),
            token_address: normalize_address(&self.token_address),
            counterparty: self.counterparty.as_deref().map(normalize_address),
            ..self.clone()
        }
    }

    /// Whether a hot-wallet row is addressed by this delta
    pub fn touches(&self, wallet: &Balance) -> bool {
        wallet.token_address == self.token_address
            && (wallet.address == self.address
                || self.counterparty.as_deref() == Some(wallet.address.as_str()))
    }
}
