use num_bigint::BigUint;

/// Parsed block header as reported by the chain account service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub hash: String,
    pub parent_hash: String,
    pub number: BigUint,
    pub timestamp: u64,
}

/// Which header to ask the provider for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderQuery {
    Latest,
    Height(BigUint),
}

/// Token transfer inside a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: String,
    pub block_number: BigUint,
    pub from: String,
    pub to: String,
    /// Native-coin transfers carry the chain's zero/placeholder token address
    pub token_address: String,
    pub amount: BigUint,
    pub fee: BigUint,
}
